//! US state region codes.
//!
//! Provides mappings between two-letter state abbreviations (the canonical
//! region code used throughout the pipeline), full state names, and
//! two-digit FIPS codes for the 50 US states + DC.

/// A single administrative region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Two-letter state abbreviation (e.g. "CA").
    pub code: &'static str,
    /// Full state name as it appears in boundary datasets.
    pub name: &'static str,
    /// Two-digit FIPS code.
    pub fips: &'static str,
}

const fn region(code: &'static str, name: &'static str, fips: &'static str) -> Region {
    Region { code, name, fips }
}

/// The 50 US states + DC, ordered by FIPS code.
pub const REGIONS: &[Region] = &[
    region("AL", "Alabama", "01"),
    region("AK", "Alaska", "02"),
    region("AZ", "Arizona", "04"),
    region("AR", "Arkansas", "05"),
    region("CA", "California", "06"),
    region("CO", "Colorado", "08"),
    region("CT", "Connecticut", "09"),
    region("DE", "Delaware", "10"),
    region("DC", "District of Columbia", "11"),
    region("FL", "Florida", "12"),
    region("GA", "Georgia", "13"),
    region("HI", "Hawaii", "15"),
    region("ID", "Idaho", "16"),
    region("IL", "Illinois", "17"),
    region("IN", "Indiana", "18"),
    region("IA", "Iowa", "19"),
    region("KS", "Kansas", "20"),
    region("KY", "Kentucky", "21"),
    region("LA", "Louisiana", "22"),
    region("ME", "Maine", "23"),
    region("MD", "Maryland", "24"),
    region("MA", "Massachusetts", "25"),
    region("MI", "Michigan", "26"),
    region("MN", "Minnesota", "27"),
    region("MS", "Mississippi", "28"),
    region("MO", "Missouri", "29"),
    region("MT", "Montana", "30"),
    region("NE", "Nebraska", "31"),
    region("NV", "Nevada", "32"),
    region("NH", "New Hampshire", "33"),
    region("NJ", "New Jersey", "34"),
    region("NM", "New Mexico", "35"),
    region("NY", "New York", "36"),
    region("NC", "North Carolina", "37"),
    region("ND", "North Dakota", "38"),
    region("OH", "Ohio", "39"),
    region("OK", "Oklahoma", "40"),
    region("OR", "Oregon", "41"),
    region("PA", "Pennsylvania", "42"),
    region("RI", "Rhode Island", "44"),
    region("SC", "South Carolina", "45"),
    region("SD", "South Dakota", "46"),
    region("TN", "Tennessee", "47"),
    region("TX", "Texas", "48"),
    region("UT", "Utah", "49"),
    region("VT", "Vermont", "50"),
    region("VA", "Virginia", "51"),
    region("WA", "Washington", "53"),
    region("WV", "West Virginia", "54"),
    region("WI", "Wisconsin", "55"),
    region("WY", "Wyoming", "56"),
];

/// Looks up a region by its two-letter code (case-insensitive).
#[must_use]
pub fn by_code(code: &str) -> Option<&'static Region> {
    let code = code.trim();
    REGIONS.iter().find(|r| r.code.eq_ignore_ascii_case(code))
}

/// Looks up a region by its full name (case-insensitive).
#[must_use]
pub fn by_name(name: &str) -> Option<&'static Region> {
    let name = name.trim();
    REGIONS.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}

/// Looks up a region by its two-digit FIPS code.
#[must_use]
pub fn by_fips(fips: &str) -> Option<&'static Region> {
    let fips = fips.trim();
    REGIONS.iter().find(|r| r.fips == fips)
}

/// Normalizes a free-form region label (code or full name) to the
/// canonical two-letter code.
///
/// Returns `None` for labels that name no known region.
#[must_use]
pub fn normalize(label: &str) -> Option<&'static str> {
    by_code(label).or_else(|| by_name(label)).map(|r| r.code)
}
