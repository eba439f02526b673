/// Provenance tag stamped on every canonical report
pub const OPENFDA_SOURCE: &str = "openfda";

/// Placeholder for display fields (drug name, reaction term) missing in the raw record
pub const UNKNOWN_SENTINEL: &str = "Unknown";

// openFDA search endpoint
pub const OPENFDA_BASE_URL: &str = "https://api.fda.gov/drug/event.json";
pub const MIN_SEARCH_LIMIT: u32 = 1;
pub const MAX_SEARCH_LIMIT: u32 = 100;
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

// Document store defaults
pub const DEFAULT_STORE_URI: &str = "sqlite://data";
pub const DEFAULT_STORE_DB: &str = "eim_platform";
pub const DEFAULT_STORE_COLLECTION: &str = "reports";
pub const MEMORY_STORE_URI: &str = "memory://";

/// Default number of reports returned by `list`
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Build the search clause for reports mentioning a medicinal product
pub fn search_term_for_drug(drug_name: &str) -> String {
    format!(
        "patient.drug.medicinalproduct:\"{}\"",
        drug_name.trim().to_uppercase()
    )
}

/// Clamp a requested result cap into the range the search endpoint accepts
pub fn clamp_search_limit(limit: i64) -> u32 {
    limit.clamp(MIN_SEARCH_LIMIT as i64, MAX_SEARCH_LIMIT as i64) as u32
}
