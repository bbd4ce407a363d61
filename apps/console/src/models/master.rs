use serde::{Deserialize, Serialize};

/// Payload of the backend's `/master/default-info` health check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterInfo {
    pub exists: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_path: Option<String>,
}

impl MasterInfo {
    /// Short label shown next to the "use default master" switch.
    pub fn hint(&self) -> String {
        if !self.exists {
            let extra = self
                .debug_path
                .as_deref()
                .map(|p| format!(" (Ruta: {p})"))
                .unwrap_or_default();
            return format!("No se encontro el maestro alojado.{extra}");
        }
        format!(
            "Usar {}",
            self.name.as_deref().unwrap_or("maestro por defecto")
        )
    }
}
