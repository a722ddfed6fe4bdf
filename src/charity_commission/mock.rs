//! Offline register data
//!
//! Used when no API key is configured or the register rejects our
//! credentials, so demos and local development still resolve well-known
//! charities.

use serde_json::{json, Value};
use tracing::info;

/// (search key, number, registered name)
const MOCK_CHARITIES: &[(&str, &str, &str)] = &[
    ("british red cross", "220949", "THE BRITISH RED CROSS SOCIETY"),
    ("oxfam", "202918", "OXFAM"),
    ("cancer research uk", "1089464", "CANCER RESEARCH UK"),
    (
        "nspcc",
        "216401",
        "NATIONAL SOCIETY FOR THE PREVENTION OF CRUELTY TO CHILDREN",
    ),
    ("save the children", "213890", "SAVE THE CHILDREN INTERNATIONAL"),
    ("barnardo's", "216250", "BARNARDO'S"),
    ("barnardos", "216250", "BARNARDO'S"),
    ("marie curie", "207994", "MARIE CURIE"),
    ("macmillan", "261017", "MACMILLAN CANCER SUPPORT"),
    ("age uk", "1128267", "AGE UK"),
    (
        "shelter",
        "263710",
        "SHELTER, NATIONAL CAMPAIGN FOR HOMELESS PEOPLE LIMITED",
    ),
];

fn summary(number: &str, name: &str) -> Value {
    json!({
        "charityNumber": number,
        "charityName": name,
        "registrationStatus": "Registered",
    })
}

/// Search the offline table.
///
/// A key matches when either string contains the other; failing that, any
/// single query word contained in a key matches.
pub fn search(search_term: &str) -> Vec<Value> {
    let query = search_term.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<Value> = MOCK_CHARITIES
        .iter()
        .filter(|(key, _, _)| query.contains(key) || key.contains(query.as_str()))
        .map(|(_, number, name)| summary(number, name))
        .collect();

    if results.is_empty() {
        let words: Vec<&str> = query.split_whitespace().collect();
        results = MOCK_CHARITIES
            .iter()
            .filter(|(key, _, _)| words.iter().any(|w| key.contains(w)))
            .map(|(_, number, name)| summary(number, name))
            .collect();
    }

    info!(search_term = search_term, results_count = results.len(), "Mock search results");
    results
}

/// Offline `/charities/{n}` record
pub fn details(charity_number: &str) -> Option<Value> {
    let record = match charity_number {
        "220949" => json!({
            "charityNumber": "220949",
            "charityName": "THE BRITISH RED CROSS SOCIETY",
            "registrationStatus": "Registered",
            "registrationDate": "1963-01-01T00:00:00Z",
            "activities": "The British Red Cross helps people in crisis, whoever and wherever they are.",
            "contact": {
                "email": "information@redcross.org.uk",
                "phone": "0344 871 11 11",
                "web": "https://www.redcross.org.uk",
                "addressLine1": "44 Moorfields",
                "addressLine2": "London",
                "postcode": "EC2Y 9AL"
            }
        }),
        "202918" => json!({
            "charityNumber": "202918",
            "charityName": "OXFAM",
            "registrationStatus": "Registered",
            "registrationDate": "1962-01-01T00:00:00Z",
            "activities": "Oxfam works to find solutions to poverty and injustice around the world.",
            "contact": {
                "email": "enquiries@oxfam.org.uk",
                "phone": "0300 200 1300",
                "web": "https://www.oxfam.org.uk",
                "addressLine1": "Oxfam House",
                "addressLine2": "John Smith Drive",
                "addressLine3": "Oxford",
                "postcode": "OX4 2JY"
            }
        }),
        "1089464" => json!({
            "charityNumber": "1089464",
            "charityName": "CANCER RESEARCH UK",
            "registrationStatus": "Registered",
            "registrationDate": "2002-02-04T00:00:00Z",
            "activities": "Cancer Research UK is dedicated to saving lives through research, influence and information.",
            "contact": {
                "email": "supporter.services@cancer.org.uk",
                "phone": "0300 123 1022",
                "web": "https://www.cancerresearchuk.org",
                "addressLine1": "2 Redman Place",
                "addressLine2": "London",
                "postcode": "E20 1JQ"
            }
        }),
        "216401" => brief(
            "216401",
            "NATIONAL SOCIETY FOR THE PREVENTION OF CRUELTY TO CHILDREN",
            "NSPCC is the leading children's charity fighting to end child abuse.",
            "https://www.nspcc.org.uk",
        ),
        "213890" => brief(
            "213890",
            "SAVE THE CHILDREN INTERNATIONAL",
            "Save the Children fights for children's rights and delivers immediate and lasting improvements.",
            "https://www.savethechildren.org.uk",
        ),
        "216250" => brief(
            "216250",
            "BARNARDO'S",
            "Barnardo's supports vulnerable children, young people and their families.",
            "https://www.barnardos.org.uk",
        ),
        "207994" => brief(
            "207994",
            "MARIE CURIE",
            "Marie Curie provides care and support for people living with terminal illness.",
            "https://www.mariecurie.org.uk",
        ),
        "261017" => brief(
            "261017",
            "MACMILLAN CANCER SUPPORT",
            "Macmillan Cancer Support provides specialist health care and support services.",
            "https://www.macmillan.org.uk",
        ),
        "1128267" => brief(
            "1128267",
            "AGE UK",
            "Age UK helps everyone make the most of later life.",
            "https://www.ageuk.org.uk",
        ),
        "263710" => brief(
            "263710",
            "SHELTER, NATIONAL CAMPAIGN FOR HOMELESS PEOPLE LIMITED",
            "Shelter helps millions of people struggling with bad housing or homelessness.",
            "https://www.shelter.org.uk",
        ),
        _ => return None,
    };
    info!(charity_number = charity_number, "Mock charity details");
    Some(record)
}

fn brief(number: &str, name: &str, activities: &str, web: &str) -> Value {
    json!({
        "charityNumber": number,
        "charityName": name,
        "registrationStatus": "Registered",
        "activities": activities,
        "contact": {"web": web}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_substring_both_ways() {
        let hits = search("Oxfam");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["charityNumber"], "202918");

        // query containing the key
        let hits = search("The British Red Cross Society");
        assert_eq!(hits[0]["charityNumber"], "220949");
    }

    #[test]
    fn test_search_word_fallback() {
        // no key contains the whole query, so single words are tried
        let hits = search("cancer charity");
        let numbers: Vec<&str> = hits
            .iter()
            .filter_map(|h| h["charityNumber"].as_str())
            .collect();
        assert!(numbers.contains(&"1089464"));
        assert!(search("zzzz qqqq").is_empty());
        assert!(search("   ").is_empty());
    }

    #[test]
    fn test_details_known_and_unknown() {
        assert!(details("1128267").is_some());
        assert!(details("999999").is_none());
    }
}
