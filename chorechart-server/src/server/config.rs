use chorechart_shared::auth::Role;
use chorechart_shared::domain::{ChoreSeed, RewardSeed, UserSeed};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashSet;
use std::{env, fs, path::Path};

pub const JWT_SECRET_ENV: &str = "CHORECHART_JWT_SECRET";
const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt_secret: String,
    /// Family timezone; drives calendar days and week starts.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
    #[serde(default)]
    pub users: Vec<UserSeed>,
    #[serde(default)]
    pub chores: Vec<ChoreSeed>,
    #[serde(default)]
    pub rewards: Vec<RewardSeed>,
}

fn default_timezone() -> Tz {
    Tz::UTC
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Invalid(m) => write!(f, "invalid config: {}", m),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        let mut cfg = Self::parse(&text)?;
        if let Ok(secret) = env::var(JWT_SECRET_ENV)
            && !secret.is_empty()
        {
            cfg.jwt_secret = secret;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses YAML without environment overrides or validation.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |m: String| Err(ConfigError::Invalid(m));

        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return invalid(format!(
                "jwt_secret must be at least {MIN_SECRET_LEN} bytes (or set {JWT_SECRET_ENV})"
            ));
        }

        let mut ids = HashSet::new();
        for u in &self.users {
            if u.id.trim().is_empty() {
                return invalid("user id cannot be empty".into());
            }
            if u.name.trim().is_empty() {
                return invalid(format!("user {} has an empty name", u.id));
            }
            if !ids.insert(u.id.as_str()) {
                return invalid(format!("duplicate user id: {}", u.id));
            }
            if let Some(p) = u.points
                && p < 0
            {
                return invalid(format!("user {} has negative points", u.id));
            }
        }
        if !self.users.iter().any(|u| u.role == Role::Admin) {
            return invalid("at least one admin user is required".into());
        }

        for c in &self.chores {
            if c.title.trim().is_empty() {
                return invalid("chore title cannot be empty".into());
            }
            if c.point_value <= 0 {
                return invalid(format!("chore '{}' must be worth at least 1 point", c.title));
            }
            if c.assigned_to.is_empty() {
                return invalid(format!("chore '{}' is not assigned to anyone", c.title));
            }
            if let Some(missing) = c.assigned_to.iter().find(|u| !ids.contains(u.as_str())) {
                return invalid(format!(
                    "chore '{}' is assigned to unknown user {missing}",
                    c.title
                ));
            }
        }

        for r in &self.rewards {
            if r.title.trim().is_empty() {
                return invalid("reward title cannot be empty".into());
            }
            if r.point_cost <= 0 {
                return invalid(format!("reward '{}' must cost at least 1 point", r.title));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
jwt_secret: "0123456789abcdef-test"
timezone: "Europe/Warsaw"
users:
  - { id: mom, name: Mom, role: admin }
  - { id: emma, name: Emma, avatar: "👧", role: child, points: 5 }
chores:
  - { title: Make bed, point_value: 5, recurrence: daily, assigned_to: [emma] }
rewards:
  - { title: Extra screen time, point_cost: 20 }
"#;

    fn with(edit: impl FnOnce(&mut AppConfig)) -> Result<(), ConfigError> {
        let mut cfg = AppConfig::parse(BASE).unwrap();
        edit(&mut cfg);
        cfg.validate()
    }

    #[test]
    fn parses_and_validates_sample() {
        let cfg = AppConfig::parse(BASE).unwrap();
        assert_eq!(cfg.timezone, chrono_tz::Europe::Warsaw);
        assert_eq!(cfg.users[1].points, Some(5));
        cfg.validate().unwrap();
    }

    #[test]
    fn timezone_defaults_to_utc() {
        let cfg = AppConfig::parse("jwt_secret: x\n").unwrap();
        assert_eq!(cfg.timezone, Tz::UTC);
        assert!(cfg.users.is_empty());
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(matches!(
            AppConfig::parse("jwt_secret: x\ntimezone: Mars/Olympus\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn rejects_short_secret() {
        assert!(matches!(
            with(|c| c.jwt_secret = "short".into()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_duplicate_users_and_missing_admin() {
        assert!(with(|c| {
            let dup = c.users[1].clone();
            c.users.push(dup);
        })
        .is_err());
        assert!(with(|c| c.users.retain(|u| u.role != Role::Admin)).is_err());
    }

    #[test]
    fn rejects_bad_chores_and_rewards() {
        assert!(with(|c| c.chores[0].assigned_to = vec!["ghost".into()]).is_err());
        assert!(with(|c| c.chores[0].point_value = 0).is_err());
        assert!(with(|c| c.chores[0].assigned_to.clear()).is_err());
        assert!(with(|c| c.rewards[0].point_cost = -1).is_err());
        assert!(with(|c| c.rewards[0].title = "  ".into()).is_err());
    }

    #[test]
    fn shipped_example_config_is_valid() {
        let cfg = AppConfig::parse(include_str!("../../config.yaml.example")).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.timezone, chrono_tz::Europe::Warsaw);
        assert_eq!(cfg.users.len(), 3);
        assert_eq!(cfg.chores.len(), 3);
        assert_eq!(cfg.rewards.len(), 3);
    }
}
