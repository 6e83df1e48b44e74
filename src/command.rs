use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const MARKER: char = '!';
pub const DEFAULT_HELP_ALIAS: &str = "help";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't read commands file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("syntax of commands file {path} is wrong: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("commands file {0} must end in .yaml, .yml or .json")]
    UnsupportedFormat(PathBuf),
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            Some("json") => Ok(Format::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize, Debug, Default)]
pub struct CommandDefinition {
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub extras: Vec<String>,
    #[serde(default)]
    pub help: String,
    #[serde(default, rename = "long-help", alias = "ajuda")]
    pub long_help: String,
    #[serde(default)]
    pub admin: bool,
}

/// The commands file exactly as authored.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug, Default)]
pub struct CommandsFile {
    #[serde(default, rename = "ignored-commands")]
    pub ignored_commands: Vec<String>,
    #[serde(default)]
    pub commands: Vec<CommandDefinition>,
}

impl CommandsFile {
    pub fn parse(source: &str, format: Format) -> Result<Self, String> {
        match format {
            Format::Yaml => serde_yaml::from_str(source).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(source).map_err(|e| e.to_string()),
        }
    }
}

/// Immutable lookup tables built from one load of the commands file.
#[derive(Debug, Default)]
pub struct Snapshot {
    file: CommandsFile,
    by_alias: HashMap<String, usize>,
    sorted_aliases: Vec<String>,
}

impl Snapshot {
    pub fn build(file: CommandsFile) -> Self {
        let mut by_alias = HashMap::new();
        let mut sorted_aliases = Vec::new();

        for (index, command) in file.commands.iter().enumerate() {
            // later definitions win on duplicate aliases
            for action in &command.actions {
                by_alias.insert(action.clone(), index);
            }
            if let Some(primary) = command.actions.first() {
                sorted_aliases.push(primary.clone());
            }
        }
        sorted_aliases.sort();

        Snapshot {
            file,
            by_alias,
            sorted_aliases,
        }
    }

    pub fn parse(source: &str, format: Format, path: &Path) -> Result<Self, ConfigError> {
        let file = CommandsFile::parse(source, format).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(Self::build(file))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let format = Format::from_path(path)?;
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source, format, path)
    }

    pub fn document(&self) -> &CommandsFile {
        &self.file
    }

    pub fn lookup(&self, alias: &str) -> Option<&CommandDefinition> {
        self.by_alias.get(alias).map(|index| &self.file.commands[*index])
    }

    pub fn primary_aliases_sorted(&self) -> &[String] {
        &self.sorted_aliases
    }

    pub fn is_ignored(&self, message: &str) -> bool {
        self.file
            .ignored_commands
            .iter()
            .any(|prefix| message.starts_with(prefix.as_str()))
    }

    pub fn is_admin(&self, alias: &str) -> bool {
        self.lookup(&normalize_alias(alias, DEFAULT_HELP_ALIAS))
            .is_some_and(|command| command.admin)
    }

    pub fn help_text(&self, input: &str) -> String {
        let alias = normalize_alias(input, DEFAULT_HELP_ALIAS);
        match self.lookup(&alias) {
            Some(command) => format!(
                "{alias}: {} (aliases: {})",
                command.help,
                command.actions.join(", ")
            ),
            None => format!("Command '{alias}' not found"),
        }
    }

    pub fn long_help_text(&self, input: &str) -> String {
        let alias = normalize_alias(input, DEFAULT_HELP_ALIAS);
        match self.lookup(&alias) {
            Some(command) if !command.long_help.is_empty() => {
                format!("{alias}: {}", command.long_help)
            }
            _ => format!("Help not found for '{alias}'"),
        }
    }
}

/// Turns whatever followed a help command into an alias: first word, marker prepended.
pub fn normalize_alias(input: &str, default: &str) -> String {
    let word = input.split(' ').next().unwrap_or_default();
    let word = if word.is_empty() { default } else { word };
    if word.starts_with(MARKER) {
        word.to_string()
    } else {
        format!("{MARKER}{word}")
    }
}

/// Owns the current snapshot and swaps in a new one on every successful reload.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    current: RwLock<Arc<Snapshot>>,
}

impl Registry {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let snapshot = Snapshot::from_file(&path)?;
        info!(
            path = %path.display(),
            commands = snapshot.document().commands.len(),
            "loaded commands"
        );

        Ok(Registry {
            path,
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Re-reads the commands file. On error the previous snapshot stays published.
    pub fn reload(&self) -> Result<Arc<Snapshot>, ConfigError> {
        let snapshot = Arc::new(Snapshot::from_file(&self.path)?);
        *self.current.write() = Arc::clone(&snapshot);
        info!(
            path = %self.path.display(),
            commands = snapshot.document().commands.len(),
            "reloaded commands"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::{fixture, rstest};
    use tempfile::NamedTempFile;

    use super::*;

    const COMMANDS_YAML: &str = r#"
ignored-commands: ["!sr", "!drop"]
commands:
  - actions: ["!ping", "!p"]
    responses: ["pong"]
    help: "replies pong"
    long-help: "checks whether the bot is alive"
  - actions: ["!echo"]
    responses: ["{{.CmdLine}}"]
    logs: ["echoed {{.CmdLine}}"]
    help: "repeats you"
  - actions: ["!ban"]
    responses: ["{{call .Command.Ban .CmdLine .Extras}}"]
    extras: ["${target} was banned", "bye ${target}"]
    help: "bans for fun"
  - actions: ["!reload"]
    responses: ["reloading"]
    admin: true
  - actions: []
    responses: ["orphan"]
"#;

    #[fixture]
    fn snapshot() -> Snapshot {
        Snapshot::parse(COMMANDS_YAML, Format::Yaml, Path::new("commands.yaml"))
            .expect("parse commands")
    }

    fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[rstest]
    fn primary_aliases_are_sorted_and_one_per_command(snapshot: Snapshot) {
        assert_eq!(
            snapshot.primary_aliases_sorted(),
            &["!ban", "!echo", "!ping", "!reload"]
        );
    }

    #[rstest]
    fn every_alias_resolves_to_its_definition(snapshot: Snapshot) {
        let ping = snapshot.lookup("!p").expect("alias");
        assert_eq!(ping.responses, vec!["pong"]);
        assert_eq!(snapshot.lookup("!ping"), Some(ping));
        assert!(snapshot.lookup("!nope").is_none());
    }

    #[rstest]
    #[case("!ping", "!ping: replies pong (aliases: !ping, !p)")]
    #[case("p", "!p: replies pong (aliases: !ping, !p)")]
    #[case("echo with trailing words", "!echo: repeats you (aliases: !echo)")]
    #[case("!unknown", "Command '!unknown' not found")]
    #[case("", "Command '!help' not found")]
    fn help_text(snapshot: Snapshot, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(snapshot.help_text(input), expected);
    }

    #[rstest]
    fn long_help_text(snapshot: Snapshot) {
        assert_eq!(snapshot.long_help_text("ping"), "!ping: checks whether the bot is alive");
        assert_eq!(snapshot.long_help_text("!echo"), "Help not found for '!echo'");
    }

    #[rstest]
    fn admin_and_ignored_lookups(snapshot: Snapshot) {
        assert!(snapshot.is_admin("!reload"));
        assert!(snapshot.is_admin("reload"));
        assert!(!snapshot.is_admin("!ping"));
        assert!(snapshot.is_ignored("!sr never gonna give you up"));
        assert!(!snapshot.is_ignored("!echo"));
    }

    #[test]
    fn duplicate_alias_last_writer_wins() {
        let source = r#"{"commands": [
            {"actions": ["!a"], "responses": ["first"]},
            {"actions": ["!b", "!a"], "responses": ["second"]}
        ]}"#;
        let snapshot = Snapshot::parse(source, Format::Json, Path::new("c.json")).expect("parse");
        assert_eq!(snapshot.lookup("!a").expect("a").responses, vec!["second"]);
        assert_eq!(snapshot.primary_aliases_sorted(), &["!a", "!b"]);
    }

    #[test]
    fn json_accepts_ajuda_as_long_help() {
        let source = r#"{"ignored-commands": ["!x"], "commands": [
            {"actions": ["!ajuda"], "ajuda": "mostra ajuda",
             "responses": ["{{call .Command.LongHelp .CmdLine}}"]}
        ]}"#;
        let snapshot = Snapshot::parse(source, Format::Json, Path::new("c.json")).expect("parse");
        assert_eq!(snapshot.long_help_text("ajuda"), "!ajuda: mostra ajuda");
        assert_eq!(snapshot.document().ignored_commands, vec!["!x"]);
    }

    #[rstest]
    fn json_and_yaml_describe_the_same_commands(snapshot: Snapshot) {
        let json = serde_json::to_string(snapshot.document()).expect("serialize");
        let from_json =
            Snapshot::parse(&json, Format::Json, Path::new("commands.json")).expect("parse json");
        assert_eq!(from_json.document(), snapshot.document());
        assert_eq!(from_json.primary_aliases_sorted(), snapshot.primary_aliases_sorted());
    }

    #[test]
    fn malformed_source_is_a_parse_error() {
        let err = Snapshot::parse("commands: [", Format::Yaml, Path::new("bad.yaml"))
            .expect_err("bad yaml");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = Snapshot::from_file(Path::new("commands.txt")).expect_err("txt");
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Registry::load("/definitely/not/here/commands.yaml").expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn reload_is_idempotent() {
        let file = write_temp(COMMANDS_YAML, ".yaml");
        let registry = Registry::load(file.path()).expect("load");
        let first = registry.snapshot();
        let second = registry.reload().expect("reload");

        assert!(!Arc::ptr_eq(&first, &second));
        for alias in ["!ping", "!p", "!echo", "!ban", "!reload", "!missing"] {
            assert_eq!(first.lookup(alias), second.lookup(alias));
        }
    }

    #[test]
    fn failed_reload_keeps_previous_snapshot() {
        let mut file = write_temp(COMMANDS_YAML, ".yaml");
        let registry = Registry::load(file.path()).expect("load");
        let before = registry.snapshot();

        file.as_file_mut().set_len(0).expect("truncate");
        std::io::Seek::rewind(file.as_file_mut()).expect("rewind");
        file.write_all(b"commands: [[[").expect("corrupt");

        assert!(registry.reload().is_err());
        assert!(Arc::ptr_eq(&before, &registry.snapshot()));
        assert!(registry.snapshot().lookup("!ping").is_some());
    }

    #[test]
    fn held_snapshot_survives_reload() {
        let mut file = write_temp(COMMANDS_YAML, ".yaml");
        let registry = Registry::load(file.path()).expect("load");
        let held = registry.snapshot();

        file.as_file_mut().set_len(0).expect("truncate");
        std::io::Seek::rewind(file.as_file_mut()).expect("rewind");
        file.write_all(b"commands:\n  - actions: [\"!new\"]\n    responses: [\"fresh\"]\n")
            .expect("rewrite");
        registry.reload().expect("reload");

        assert!(held.lookup("!ping").is_some());
        assert!(registry.snapshot().lookup("!ping").is_none());
        assert!(registry.snapshot().lookup("!new").is_some());
    }

    #[rstest]
    #[case("", "help", "!help")]
    #[case("ban", "help", "!ban")]
    #[case("!ban someone", "help", "!ban")]
    fn normalize(#[case] input: &str, #[case] default: &str, #[case] expected: &str) {
        assert_eq!(normalize_alias(input, default), expected);
    }
}
