/// Selects default namespace fan-out, strategy defaults and risk posture.
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// The built-in strategy name used when `DeploymentOptions.strategy_name`
    /// is not set.
    pub fn default_strategy_name(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
