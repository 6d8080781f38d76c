//! Bundled symbolic-name -> short-UUID constants for the HAP-defined
//! services and characteristics this workspace's tests and examples
//! exercise. Not exhaustive; unknown entries pass through unchanged.

pub(crate) const SYMBOLIC_TO_SHORT: &[(&str, &str)] = &[
    // Services
    ("public.hap.service.accessory-information", "3E"),
    ("public.hap.service.lightbulb", "43"),
    ("public.hap.service.switch", "49"),
    ("public.hap.service.outlet", "47"),
    ("public.hap.service.thermostat", "4A"),
    ("public.hap.service.fan", "40"),
    ("public.hap.service.lock-mechanism", "45"),
    ("public.hap.service.pairing", "55"),
    // Characteristics
    ("on", "25"),
    ("brightness", "8"),
    ("hue", "13"),
    ("saturation", "2F"),
    ("name", "23"),
    ("manufacturer", "20"),
    ("model", "21"),
    ("serial-number", "30"),
    ("firmware-revision", "52"),
    ("identify", "14"),
    ("current-temperature", "11"),
    ("target-temperature", "35"),
    ("lock-current-state", "1D"),
    ("lock-target-state", "1E"),
];
