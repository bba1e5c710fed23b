//! Fixed fishery site directory.
//!
//! Site codes are assigned by the clinic and embedded in derived patient
//! ids, so the table is a compile-time constant checked by membership
//! rather than a configurable mapping.

/// (fishery name, two-digit site code)
pub const SITE_DIRECTORY: &[(&str, &str)] = &[
    ("Silver Bay", "33"),
    ("Copper River", "07"),
    ("Bristol Bay", "12"),
    ("Icicle Seafoods", "21"),
    ("Trident Naknek", "28"),
    ("Leader Creek", "41"),
];

/// Look up the site code for a fishery name, case-insensitively.
pub fn code_for(fishery_name: &str) -> Option<&'static str> {
    let wanted = fishery_name.trim();
    SITE_DIRECTORY
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        .map(|(_, code)| *code)
}

/// All known fishery names, for input validation and UI pick-lists.
pub fn fishery_names() -> impl Iterator<Item = &'static str> {
    SITE_DIRECTORY.iter().map(|(name, _)| *name)
}
