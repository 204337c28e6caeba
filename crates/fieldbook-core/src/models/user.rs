//! Field staff user profile

use serde::{Deserialize, Serialize};

use super::record::impl_record;
use super::{Collection, RecordId};

/// An employee profile, including the HR details collected during onboarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub mpin: Option<String>,
    #[serde(default)]
    pub is_mpin_set: bool,

    // Basic info
    pub father_name: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,

    // Contact
    pub whatsapp_number: Option<String>,
    pub alternate_mobile_number: Option<String>,

    // Address
    pub address_line: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub tehsil: Option<String>,
    pub village: Option<String>,
    pub pincode: Option<String>,

    // Bank details
    pub bank_name: Option<String>,
    pub account_holder_name: Option<String>,
    pub account_number: Option<String>,
    pub upi_id: Option<String>,

    // Emergency contact
    pub emergency_person_name: Option<String>,
    pub emergency_relation: Option<String>,
    pub emergency_contact_number: Option<String>,

    // Documents
    pub aadhaar_number: Option<String>,
    pub pan_number: Option<String>,
    pub driving_license_number: Option<String>,
    pub profile_photo: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl_record!(User, Collection::Users);
