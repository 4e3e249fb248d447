//! Static country-code lookups: region grouping and flag emoji.

/// Region a 2-letter country code belongs to. Unknown codes (including the
/// "XX" unknown marker) map to an empty region, not an error.
pub fn region_from_cc(cc: &str) -> &'static str {
    match cc {
        "AT" | "BE" | "BG" | "CH" | "CY" | "CZ" | "DE" | "DK" | "EE" | "ES" | "FI" | "FR"
        | "GB" | "GR" | "HR" | "HU" | "IE" | "IS" | "IT" | "LT" | "LU" | "LV" | "MD" | "MT"
        | "NL" | "NO" | "PL" | "PT" | "RO" | "RS" | "SE" | "SI" | "SK" | "UA" => "Europe",
        "AE" | "AM" | "AZ" | "BD" | "BH" | "CN" | "GE" | "HK" | "ID" | "IL" | "IN" | "IQ"
        | "IR" | "JO" | "JP" | "KG" | "KH" | "KR" | "KW" | "KZ" | "LA" | "LK" | "MM" | "MN"
        | "MO" | "MY" | "NP" | "OM" | "PH" | "PK" | "QA" | "SA" | "SG" | "TH" | "TJ" | "TM"
        | "TR" | "TW" | "UZ" | "VN" => "Asia",
        "AR" | "BO" | "BR" | "CA" | "CL" | "CO" | "CR" | "DO" | "EC" | "GT" | "MX" | "PA"
        | "PE" | "PR" | "PY" | "US" | "UY" | "VE" => "Americas",
        "DZ" | "EG" | "ET" | "GH" | "KE" | "LY" | "MA" | "MU" | "NG" | "SC" | "TN" | "ZA" => {
            "Africa"
        }
        "AU" | "FJ" | "NZ" | "PG" => "Oceania",
        "RU" => "Europe",
        _ => "",
    }
}

/// Flag emoji for a 2-letter country code via regional indicator symbols.
/// Anything that is not two ASCII letters gets a white flag.
pub fn cc_to_emoji(cc: &str) -> String {
    let cc = cc.to_ascii_uppercase();
    let bytes = cc.as_bytes();
    if bytes.len() != 2 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
        return "\u{1F3F3}".to_string();
    }
    bytes
        .iter()
        .filter_map(|b| char::from_u32(0x1F1E6 + (*b - b'A') as u32))
        .collect()
}
