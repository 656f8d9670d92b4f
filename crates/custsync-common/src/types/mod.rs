//! Customer types shared between the relational and tabular sides

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customer as stored in the relational store.
///
/// `email` is the business key that joins the relational and tabular copies.
/// `id`, `created_at` and `updated_at` are owned by the relational store and
/// are never derived from the tabular side.
///
/// # Examples
///
/// ```rust
/// use custsync_common::types::CustomerRecord;
///
/// let now = chrono::Utc::now();
/// let record = CustomerRecord {
///     id: 7,
///     name: "Jane Smith".to_string(),
///     email: "jane.smith@example.com".to_string(),
///     phone: Some("9876543210".to_string()),
///     address: None,
///     city: Some("Los Angeles".to_string()),
///     state: Some("CA".to_string()),
///     country: Some("USA".to_string()),
///     postal_code: Some("90001".to_string()),
///     created_at: now,
///     updated_at: now,
/// };
/// assert_eq!(record.fields().email, "jane.smith@example.com");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerRecord {
    /// Surrogate key assigned by the relational store
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerRecord {
    /// The fields the tabular side is authoritative for
    pub fn fields(&self) -> CustomerFields {
        CustomerFields {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
            postal_code: self.postal_code.clone(),
        }
    }

    /// Overwrite every mapped field in place, leaving id and timestamps alone
    pub fn apply(&mut self, fields: CustomerFields) {
        self.name = fields.name;
        self.email = fields.email;
        self.phone = fields.phone;
        self.address = fields.address;
        self.city = fields.city;
        self.state = fields.state;
        self.country = fields.country;
        self.postal_code = fields.postal_code;
    }
}

/// The mapped subset of a customer: name through postal code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CustomerFields {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}
