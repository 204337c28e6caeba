//! Individual customer model

use serde::{Deserialize, Serialize};

use super::record::impl_record;
use super::{Collection, RecordId};

/// An individual (B2C) customer registered by field staff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerB2C {
    pub id: RecordId,
    pub name: String,
    pub father_name: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,

    // Contact
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp_number: Option<String>,
    pub alternate_mobile_number: Option<String>,

    // Address
    pub address_line: Option<String>,
    pub pincode: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub tehsil: Option<String>,
    pub village: Option<String>,
    pub city: Option<String>,

    pub registered_by: Option<String>,
    pub team: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl_record!(CustomerB2C, Collection::CustomersB2C);
