#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "player".to_string(),
        }
    }
}
