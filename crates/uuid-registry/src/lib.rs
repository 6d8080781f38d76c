//! Short/long/symbolic UUID mapping for HAP services and characteristics.

mod table;

const BASE_SUFFIX: &str = "-0000-1000-8000-0026BB765291";

/// Pad a short 8-hex-digit UUID form to its full 128-bit HAP base UUID,
/// and uppercase the result. A 36-character input is assumed already
/// long and is only uppercased. Anything else passes through
/// unchanged.
pub fn ensure_long_uuid(uuid: &str) -> String {
    if uuid.len() == 8 && uuid.chars().all(|c| c.is_ascii_hexdigit()) {
        format!("{}{}", uuid.to_uppercase(), BASE_SUFFIX)
    } else if uuid.len() == 36 {
        uuid.to_uppercase()
    } else {
        uuid.to_string()
    }
}

/// Resolve a symbolic HAP name (`"public.hap.service.lightbulb"`,
/// `"on"`) to its long-form UUID. Unknown names pass through
/// unchanged.
pub fn symbolic_to_uuid(name: &str) -> String {
    table::SYMBOLIC_TO_SHORT
        .iter()
        .find(|(sym, _)| *sym == name)
        .map(|(_, short)| ensure_long_uuid(short))
        .unwrap_or_else(|| name.to_string())
}

/// Resolve a UUID (short or long) to its symbolic HAP name. Unknown
/// UUIDs pass through unchanged (normalized to long form when they
/// look like a short HAP-base UUID).
pub fn uuid_to_symbolic(uuid: &str) -> String {
    let long = ensure_long_uuid(uuid);
    table::SYMBOLIC_TO_SHORT
        .iter()
        .find(|(_, short)| ensure_long_uuid(short) == long)
        .map(|(sym, _)| sym.to_string())
        .unwrap_or(long)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_short_form_to_base_uuid() {
        assert_eq!(
            ensure_long_uuid("43"),
            "00000043-0000-1000-8000-0026BB765291"
        );
    }

    #[test]
    fn uppercases_already_long_form() {
        let long = "0000004300001000800000";
        assert_eq!(ensure_long_uuid(long), long.to_string());
    }

    #[test]
    fn unknown_uuid_passes_through() {
        assert_eq!(ensure_long_uuid("not-a-uuid"), "not-a-uuid");
    }

    #[test]
    fn symbolic_round_trips_through_uuid() {
        let uuid = symbolic_to_uuid("public.hap.service.lightbulb");
        assert_eq!(uuid, "00000043-0000-1000-8000-0026BB765291");
        assert_eq!(uuid_to_symbolic(&uuid), "public.hap.service.lightbulb");
    }

    #[test]
    fn unknown_symbolic_name_passes_through() {
        assert_eq!(symbolic_to_uuid("vendor.custom.thing"), "vendor.custom.thing");
    }
}
