// Battery domain model
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Battery {
    pub id: String,
    pub name: String,
}

impl Battery {
    pub fn new(id: String) -> Self {
        let name = Self::format_name(&id);
        Self { id, name }
    }

    fn format_name(id: &str) -> String {
        // Convert "BAT-0x440" to "Battery 0x440" and "pack_12" to "pack 12"
        match id.strip_prefix("BAT-") {
            Some(rest) => format!("Battery {}", rest.replace('_', " ")),
            None => id.replace('_', " "),
        }
    }
}
