//! Business customer model

use serde::{Deserialize, Serialize};

use super::record::impl_record;
use super::{Collection, RecordId};

/// A business (B2B) customer registered by field staff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerB2B {
    pub id: RecordId,
    pub name: String,
    pub company_name: Option<String>,
    pub gstin: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub branch_type: Option<String>,

    // Address
    pub address_line: Option<String>,
    pub pincode: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub tehsil: Option<String>,
    pub village: Option<String>,

    pub registered_by: Option<String>,
    pub team: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl_record!(CustomerB2B, Collection::CustomersB2B);
