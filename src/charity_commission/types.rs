//! Charity Commission register response types
//!
//! The register API is loosely typed (numbers arrive as strings or integers,
//! field names vary between endpoints), so raw responses are kept as
//! `serde_json::Value` and mapped into these structs field by field.
//!
//! Reference: https://api-portal.charitycommission.gov.uk/

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One hit from `/allcharities`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharitySummary {
    pub charity_number: String,
    pub name: String,
    pub status: Option<String>,
    /// Raw hit, persisted as candidate data
    pub raw: Value,
}

impl CharitySummary {
    /// Map a raw search hit. Hits without a number are dropped.
    pub fn from_raw(raw: Value) -> Option<Self> {
        let charity_number = first_string(&raw, &["charityNumber", "registeredCharityNumber"])?;
        let name = first_string(&raw, &["charityName", "name"]).unwrap_or_default();
        let status = first_string(&raw, &["registrationStatus"]);
        Some(Self {
            charity_number,
            name,
            status,
            raw,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trustee {
    pub name: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subsidiary {
    pub name: String,
    pub company_number: Option<String>,
}

impl Subsidiary {
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            name: first_string(raw, &["subsidiaryName", "name"])
                .unwrap_or_else(|| "Unknown".to_string()),
            company_number: first_string(raw, &["companyNumber"]),
        }
    }
}

/// Normalised register record for one charity, including related lists
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CharityDetails {
    pub charity_number: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub removal_date: Option<NaiveDate>,
    pub activities: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub latest_income: Option<f64>,
    pub latest_expenditure: Option<f64>,
    pub financial_year_end: Option<NaiveDate>,
    pub trustees: Vec<Trustee>,
    pub subsidiaries: Vec<Subsidiary>,
}

/// Map a raw `/charities/{n}` record (optionally carrying `trustees`,
/// `accounts` and `subsidiaries` arrays) into [`CharityDetails`].
pub fn parse_charity_data(data: &Value) -> CharityDetails {
    let contact = data.get("contact").filter(|c| c.is_object());
    let contact_field = |key: &str| contact.and_then(|c| first_string(c, &[key]));

    let address_parts: Vec<String> = [
        "addressLine1",
        "addressLine2",
        "addressLine3",
        "addressLine4",
        "postcode",
    ]
    .iter()
    .filter_map(|key| contact_field(key))
    .collect();

    let latest_account = data
        .get("accounts")
        .and_then(|a| a.as_array())
        .and_then(|a| a.first());

    let trustees = array_of(data, "trustees")
        .iter()
        .map(|t| Trustee {
            name: first_string(t, &["trusteeName", "name"]).unwrap_or_default(),
            id: first_string(t, &["trusteeId", "id"]),
        })
        .collect();

    let subsidiaries = array_of(data, "subsidiaries")
        .iter()
        .map(Subsidiary::from_raw)
        .collect();

    CharityDetails {
        charity_number: first_string(data, &["charityNumber", "registeredCharityNumber"])
            .unwrap_or_default(),
        name: first_string(data, &["charityName", "name"]),
        status: first_string(data, &["registrationStatus"]),
        registration_date: data.get("registrationDate").and_then(parse_date),
        removal_date: data.get("removalDate").and_then(parse_date),
        activities: first_string(data, &["activities"]),
        contact_email: contact_field("email"),
        contact_phone: contact_field("phone"),
        website: contact_field("web"),
        address: if address_parts.is_empty() {
            None
        } else {
            Some(address_parts.join(", "))
        },
        latest_income: latest_account
            .and_then(|a| a.get("totalGrossIncome"))
            .and_then(as_f64),
        latest_expenditure: latest_account
            .and_then(|a| a.get("totalGrossExpenditure"))
            .and_then(as_f64),
        financial_year_end: latest_account
            .and_then(|a| a.get("financialYearEnd"))
            .and_then(parse_date),
        trustees,
        subsidiaries,
    }
}

/// Entries of a search response, which is either `{"charities": [...]}` or a bare list
pub fn search_hits(response: Value) -> Vec<Value> {
    match response {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("charities") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Elements of an array field, empty when missing or not an array
pub(crate) fn array_of<'a>(data: &'a Value, key: &str) -> &'a [Value] {
    data.get(key)
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// First non-empty field among `keys`, rendering numbers as text
fn first_string(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

/// ISO date or datetime ("1963-01-01T00:00:00Z") to a calendar date
fn parse_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_record() {
        let raw = json!({
            "registeredCharityNumber": 220949,
            "charityName": "THE BRITISH RED CROSS SOCIETY",
            "registrationStatus": "Registered",
            "registrationDate": "1963-01-01T00:00:00Z",
            "removalDate": null,
            "activities": "Helps people in crisis",
            "contact": {
                "email": "information@redcross.org.uk",
                "web": "https://www.redcross.org.uk",
                "addressLine1": "44 Moorfields",
                "addressLine2": "London",
                "addressLine3": "",
                "postcode": "EC2Y 9AL"
            },
            "accounts": [
                {"totalGrossIncome": "312000000", "totalGrossExpenditure": 298000000.5, "financialYearEnd": "2023-12-31"},
                {"totalGrossIncome": 1}
            ],
            "trustees": [{"trusteeName": "Jane Smith", "trusteeId": 42}],
            "subsidiaries": [{"subsidiaryName": "BRC TRADING LIMITED", "companyNumber": "00941800"}]
        });

        let parsed = parse_charity_data(&raw);
        assert_eq!(parsed.charity_number, "220949");
        assert_eq!(parsed.name.as_deref(), Some("THE BRITISH RED CROSS SOCIETY"));
        assert_eq!(parsed.registration_date, NaiveDate::from_ymd_opt(1963, 1, 1));
        assert_eq!(parsed.removal_date, None);
        assert_eq!(
            parsed.address.as_deref(),
            Some("44 Moorfields, London, EC2Y 9AL")
        );
        assert_eq!(parsed.latest_income, Some(312_000_000.0));
        assert_eq!(parsed.latest_expenditure, Some(298_000_000.5));
        assert_eq!(parsed.financial_year_end, NaiveDate::from_ymd_opt(2023, 12, 31));
        assert_eq!(
            parsed.trustees,
            vec![Trustee {
                name: "Jane Smith".into(),
                id: Some("42".into())
            }]
        );
        assert_eq!(
            parsed.subsidiaries[0].company_number.as_deref(),
            Some("00941800")
        );
    }

    #[test]
    fn test_parse_sparse_record() {
        let parsed = parse_charity_data(&json!({"charityNumber": "202918", "contact": null}));
        assert_eq!(parsed.charity_number, "202918");
        assert!(parsed.address.is_none());
        assert!(parsed.latest_income.is_none());
        assert!(parsed.trustees.is_empty());
    }

    #[test]
    fn test_search_hits_shapes() {
        let wrapped = json!({"charities": [{"charityNumber": "1"}]});
        let bare = json!([{"charityNumber": "1"}, {"charityNumber": "2"}]);
        assert_eq!(search_hits(wrapped).len(), 1);
        assert_eq!(search_hits(bare).len(), 2);
        assert!(search_hits(json!({"unexpected": true})).is_empty());
    }

    #[test]
    fn test_summary_requires_number() {
        assert!(CharitySummary::from_raw(json!({"charityName": "No number"})).is_none());
        let s = CharitySummary::from_raw(json!({"charityNumber": 1089464, "name": "CRUK"})).unwrap();
        assert_eq!(s.charity_number, "1089464");
        assert_eq!(s.name, "CRUK");
    }
}
