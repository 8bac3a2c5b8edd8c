use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/wol-tg-bot.json";

// Keys are matched case-insensitively (see `fold_keys`), so every field name
// here is the lowercased form of the documented PascalCase key.

/// A machine that can be woken from the chat.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct MachineEntry {
    /// Button label and the exact text that triggers the wake
    pub name: String,
    /// Hardware address, e.g. "aa:bb:cc:dd:ee:ff"
    pub mac: String,
    /// Where the magic packet goes, "host:port" or a bare broadcast IP
    pub address: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct BotConfig {
    #[serde(rename = "botkey")]
    pub bot_key: String,
    #[serde(rename = "ownerid")]
    pub owner_id: i64,
    /// Zero means no channel is configured
    #[serde(rename = "channelid")]
    pub channel_id: i64,
}

impl BotConfig {
    /// The configured channel, if any. Channel posts and post-wake message
    /// deletion are only enabled when this returns `Some`.
    pub fn channel_id(&self) -> Option<i64> {
        (self.channel_id != 0).then_some(self.channel_id)
    }

    /// Whether events from `chat_id` may issue commands.
    pub fn is_authorized(&self, chat_id: i64) -> bool {
        chat_id == self.owner_id || self.channel_id() == Some(chat_id)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub machines: Vec<MachineEntry>,
    pub bot: BotConfig,
}

/// Lowercase every object key and drop `null` members, so `"OwnerId"`,
/// `"ownerId"` and `"ownerid"` all land on the same field and a null leaves
/// the field at its zero value.
fn fold_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut folded = Map::with_capacity(map.len());
            for (key, value) in map {
                if value.is_null() {
                    continue;
                }
                // keys differing only in case collapse; the first in map order is kept
                folded
                    .entry(key.to_lowercase())
                    .or_insert_with(|| fold_keys(value));
            }
            Value::Object(folded)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(fold_keys).collect()),
        other => other,
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(content)?;
        let config = AppConfig::deserialize(fold_keys(raw))?;
        Ok(config)
    }

    /// First machine whose name equals `text` exactly.
    pub fn find_machine(&self, text: &str) -> Option<&MachineEntry> {
        self.machines.iter().find(|m| m.name == text)
    }

    /// Machine names in configured order.
    pub fn machine_names(&self) -> Vec<String> {
        self.machines.iter().map(|m| m.name.clone()).collect()
    }

    /// Log suspicious but loadable settings. Never rejects a config.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.bot.bot_key.trim().is_empty() {
            warnings.push("Bot.BotKey is empty".to_string());
        }
        if self.bot.owner_id == 0 {
            warnings.push("Bot.OwnerId is not set".to_string());
        }
        if self.machines.is_empty() {
            warnings.push("no machines configured".to_string());
        }

        let mut seen = HashSet::new();
        for machine in &self.machines {
            if !seen.insert(machine.name.as_str()) {
                warnings.push(format!(
                    "duplicate machine name '{}', only the first entry is reachable",
                    machine.name
                ));
            }
        }

        for w in &warnings {
            warn!("Config: {}", w);
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "Machines": [
            { "Name": "Desktop", "Mac": "00:11:22:33:44:55", "Address": "10.0.0.255:9" },
            { "Name": "NAS", "Mac": "aa-bb-cc-dd-ee-ff", "Address": "10.0.0.255" }
        ],
        "Bot": { "BotKey": "x", "OwnerId": 1, "ChannelId": -100200 }
    }"#;

    #[test]
    fn test_parse_pascal_case_keys() {
        let config = AppConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.machines.len(), 2);
        assert_eq!(config.machines[0].name, "Desktop");
        assert_eq!(config.machines[0].mac, "00:11:22:33:44:55");
        assert_eq!(config.machines[1].address, "10.0.0.255");
        assert_eq!(config.bot.bot_key, "x");
        assert_eq!(config.bot.owner_id, 1);
        assert_eq!(config.bot.channel_id(), Some(-100200));
    }

    #[test]
    fn test_channel_id_optional() {
        let config =
            AppConfig::from_json(r#"{"Machines":[],"Bot":{"BotKey":"x","OwnerId":1}}"#).unwrap();
        assert_eq!(config.bot.channel_id, 0);
        assert_eq!(config.bot.channel_id(), None);

        let zero = AppConfig::from_json(
            r#"{"Machines":[],"Bot":{"BotKey":"x","OwnerId":1,"ChannelId":0}}"#,
        )
        .unwrap();
        assert_eq!(zero.bot.channel_id(), None);
    }

    #[test]
    fn test_is_authorized() {
        let config = AppConfig::from_json(SAMPLE).unwrap();
        assert!(config.bot.is_authorized(1));
        assert!(config.bot.is_authorized(-100200));
        assert!(!config.bot.is_authorized(2));

        let no_channel =
            AppConfig::from_json(r#"{"Bot":{"BotKey":"x","OwnerId":1}}"#).unwrap();
        // chat id 0 must not slip through as "the unset channel"
        assert!(!no_channel.bot.is_authorized(0));
    }

    #[test]
    fn test_find_machine_exact_and_case_sensitive() {
        let config = AppConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.find_machine("NAS").unwrap().mac, "aa-bb-cc-dd-ee-ff");
        assert!(config.find_machine("nas").is_none());
        assert!(config.find_machine("NAS ").is_none());
        assert!(config.find_machine("").is_none());
    }

    #[test]
    fn test_find_machine_first_duplicate_wins() {
        let config = AppConfig::from_json(
            r#"{"Machines":[
                {"Name":"PC1","Mac":"00:00:00:00:00:01","Address":"a:9"},
                {"Name":"PC1","Mac":"00:00:00:00:00:02","Address":"b:9"}
            ],"Bot":{"BotKey":"x","OwnerId":1}}"#,
        )
        .unwrap();
        assert_eq!(config.find_machine("PC1").unwrap().address, "a:9");
        assert_eq!(config.machine_names(), vec!["PC1", "PC1"]);
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_validate_clean_config() {
        let config = AppConfig::from_json(SAMPLE).unwrap();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.machine_names(), vec!["Desktop", "NAS"]);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ \"Machines\": [").unwrap();

        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_keys_match_case_insensitively() {
        let config = AppConfig::from_json(
            r#"{"machines":[{"name":"Desktop","MAC":"00:11:22:33:44:55","address":"10.0.0.255:9"}],
                "bot":{"botKey":"x","ownerid":1,"CHANNELID":-5}}"#,
        )
        .unwrap();
        assert_eq!(config.machines[0].name, "Desktop");
        assert_eq!(config.machines[0].mac, "00:11:22:33:44:55");
        assert_eq!(config.machines[0].address, "10.0.0.255:9");
        assert_eq!(config.bot.bot_key, "x");
        assert_eq!(config.bot.owner_id, 1);
        assert_eq!(config.bot.channel_id(), Some(-5));
    }

    #[test]
    fn test_missing_fields_take_zero_values() {
        let config = AppConfig::from_json(
            r#"{"Machines":[{"Name":"Desktop","Mac":"00:11:22:33:44:55"}]}"#,
        )
        .unwrap();
        assert_eq!(config.machines[0].address, "");
        assert_eq!(config.bot, BotConfig::default());
        assert_eq!(config.validate().len(), 2);

        assert_eq!(AppConfig::from_json("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_null_members_take_zero_values() {
        let config =
            AppConfig::from_json(r#"{"Machines":null,"Bot":{"BotKey":null,"OwnerId":7}}"#)
                .unwrap();
        assert!(config.machines.is_empty());
        assert_eq!(config.bot.bot_key, "");
        assert_eq!(config.bot.owner_id, 7);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = AppConfig::from_json(
            r#"{"Machines":[],"Bot":{"BotKey":"x","OwnerId":1,"Extra":true},"Comment":"hi"}"#,
        )
        .unwrap();
        assert_eq!(config.bot.owner_id, 1);
    }

    #[test]
    fn test_wrong_types_still_fail() {
        assert!(AppConfig::from_json(r#"{"Bot":{"OwnerId":"one"}}"#).is_err());
        assert!(AppConfig::from_json(r#""just a string""#).is_err());
    }
}
