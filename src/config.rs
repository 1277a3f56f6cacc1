//! JSON configuration loading.
//!
//! The persisted configuration format is a single JSON document with lists
//! of triggers, aliases, hotkeys, tabs, context rules, variables (`USER`
//! only), connection profiles, and an encoding label. Unknown top-level keys
//! are ignored -- achieved naturally by not setting `#[serde(deny_unknown_fields)]`,
//! a permissive-by-default posture toward directives it doesn't recognize.
//! A malformed individual record (bad regex, bad scope) is rejected without
//! poisoning the rest of the document; only a document that isn't valid
//! JSON at all fails whole.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::aliases::{Alias, AliasStore};
use crate::attr::{color, Attr};
use crate::context_queue::{ContextCommandRule, ContextQueue, RuleTrigger, Scope};
use crate::pattern::Pattern;
use crate::tabs::{CaptureMode, Tab, TabFilter, TabRouter};
use crate::triggers::{Trigger, TriggerStore};
use crate::var::{Source, VarStore};

/// A non-fatal error encountered while loading one record from a config
/// document. The record is skipped; loading continues with the rest.
#[derive(Debug)]
pub struct ConfigError {
    pub record: String,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.record, self.message)
    }
}

impl std::error::Error for ConfigError {}

fn default_true() -> bool {
    true
}

fn default_max_lines() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "UPPERCASE")]
enum RawCaptureMode {
    #[default]
    Copy,
    Move,
}

#[derive(Debug, Deserialize)]
struct RawColorize {
    fg: Option<String>,
    bg: Option<String>,
    #[serde(default)]
    bold: bool,
}

#[derive(Debug, Deserialize)]
struct RawTrigger {
    id: u64,
    pattern: String,
    #[serde(default)]
    priority: i32,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    once: bool,
    #[serde(default)]
    gag: bool,
    #[serde(default)]
    colorize: Option<RawColorize>,
    #[serde(default)]
    commands: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAlias {
    id: u64,
    pattern: String,
    #[serde(default)]
    priority: i32,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    commands: Vec<String>,
}

/// Key-binding records are accepted and carried as inert data: dispatching a
/// hotkey press is a UI concern this crate doesn't implement.
#[derive(Debug, Deserialize, Clone)]
pub struct Hotkey {
    pub key: String,
    pub command: String,
}

#[derive(Debug, Deserialize)]
struct RawTabFilter {
    pattern: String,
    #[serde(default)]
    replacement: Option<String>,
    #[serde(default)]
    match_on_colored_text: bool,
}

#[derive(Debug, Deserialize)]
struct RawTab {
    id: String,
    #[serde(default)]
    filters: Vec<RawTabFilter>,
    #[serde(default)]
    capture_mode: RawCaptureMode,
    #[serde(default = "default_max_lines")]
    max_lines: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawScope {
    World,
    Room {
        #[serde(default)]
        ids: Vec<String>,
        #[serde(default)]
        tags: Vec<String>,
    },
    Zone {
        names: Vec<String>,
    },
}

/// Either the literal string `"permanent"` or `{"pattern": "<regex>"}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRuleTrigger {
    Tag(String),
    Pattern { pattern: String },
}

#[derive(Debug, Deserialize)]
struct RawContextRule {
    id: u64,
    #[serde(default = "default_true")]
    enabled: bool,
    trigger: RawRuleTrigger,
    scope: RawScope,
    command: String,
    #[serde(default)]
    priority: i32,
}

/// A persisted server connection profile (host/port/encoding to dial).
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionProfile {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawDocument {
    triggers: Vec<RawTrigger>,
    aliases: Vec<RawAlias>,
    hotkeys: Vec<Hotkey>,
    tabs: Vec<RawTab>,
    context_rules: Vec<RawContextRule>,
    /// USER-sourced variables only; MSDP/STATUS/SYSTEM values are runtime
    /// state, not something a persisted document can assert.
    variables: BTreeMap<String, String>,
    connection_profiles: Vec<ConnectionProfile>,
    encoding: Option<String>,
}

/// Everything this crate loads out of one configuration document.
pub struct Config {
    pub triggers: TriggerStore,
    pub aliases: AliasStore,
    pub tabs: TabRouter,
    pub context_rules: ContextQueue,
    pub vars: VarStore,
    pub hotkeys: Vec<Hotkey>,
    pub connection_profiles: Vec<ConnectionProfile>,
    pub encoding: Option<String>,
}

/// Default queue depth for context rules loaded without a connection
/// already telling us a server-advertised limit.
const DEFAULT_CONTEXT_QUEUE_SIZE: usize = 50;

impl Default for Config {
    fn default() -> Self {
        Self {
            triggers: TriggerStore::new(),
            aliases: AliasStore::new(),
            tabs: TabRouter::default(),
            context_rules: ContextQueue::new(DEFAULT_CONTEXT_QUEUE_SIZE),
            vars: VarStore::new(),
            hotkeys: Vec::new(),
            connection_profiles: Vec::new(),
            encoding: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document. Unknown top-level keys are
    /// ignored; a record that fails to build (bad regex, bad scope) is
    /// reported in the returned error list and skipped, leaving the rest of
    /// the document intact. A document that fails to parse as JSON at all
    /// yields an empty `Config` and a single error.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut errors = Vec::new();
        let raw: RawDocument = match serde_json::from_str(s) {
            Ok(doc) => doc,
            Err(e) => {
                errors.push(ConfigError {
                    record: "<document>".to_string(),
                    message: e.to_string(),
                });
                return (Config::default(), errors);
            }
        };

        let mut config = Config::default();

        for t in raw.triggers {
            let id = t.id;
            match build_trigger(t) {
                Ok(trigger) => config.triggers.add(trigger),
                Err(message) => errors.push(ConfigError { record: format!("trigger {id}"), message }),
            }
        }

        for a in raw.aliases {
            let id = a.id;
            match build_alias(a) {
                Ok(alias) => config.aliases.add(alias),
                Err(message) => errors.push(ConfigError { record: format!("alias {id}"), message }),
            }
        }

        for t in raw.tabs {
            let id = t.id.clone();
            match build_tab(t) {
                Ok(tab) => {
                    if !config.tabs.add_tab(tab) {
                        errors.push(ConfigError {
                            record: format!("tab {id}"),
                            message: "tab id collides with a system tab or an existing tab".to_string(),
                        });
                    }
                }
                Err(message) => errors.push(ConfigError { record: format!("tab {id}"), message }),
            }
        }

        for r in raw.context_rules {
            let id = r.id;
            match build_context_rule(r) {
                Ok(rule) => config.context_rules.add_rule(rule),
                Err(message) => errors.push(ConfigError { record: format!("context rule {id}"), message }),
            }
        }

        for (name, value) in raw.variables {
            config.vars.set_str(name, value, Source::User);
        }

        config.hotkeys = raw.hotkeys;
        config.connection_profiles = raw.connection_profiles;
        config.encoding = raw.encoding;

        (config, errors)
    }

    /// Read and parse a configuration file from disk.
    pub fn load_file(path: &std::path::Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }
}

fn build_trigger(raw: RawTrigger) -> Result<Trigger, String> {
    let pattern = Pattern::new(&raw.pattern).map_err(|e| e.to_string())?;
    let mut trigger = Trigger::new(raw.id, pattern, raw.priority);
    trigger.enabled = raw.enabled;
    trigger.once = raw.once;
    trigger.gag = raw.gag;
    trigger.commands = raw.commands;
    trigger.colorize = raw.colorize.map(build_colorize);
    Ok(trigger)
}

fn build_colorize(raw: RawColorize) -> Attr {
    let mut attr = Attr::EMPTY;
    if raw.bold {
        attr |= Attr::BOLD;
    }
    if let Some(fg) = raw.fg.as_deref().and_then(color_index) {
        attr = attr.with_fg(fg);
    }
    if let Some(bg) = raw.bg.as_deref().and_then(color_index) {
        attr = attr.with_bg(bg);
    }
    attr
}

fn color_index(name: &str) -> Option<u8> {
    Some(match name.to_ascii_lowercase().as_str() {
        "black" => color::BLACK,
        "red" => color::RED,
        "green" => color::GREEN,
        "yellow" => color::YELLOW,
        "blue" => color::BLUE,
        "magenta" => color::MAGENTA,
        "cyan" => color::CYAN,
        "white" => color::WHITE,
        "gray" | "grey" => color::GRAY,
        "bright_red" => color::BRIGHT_RED,
        "bright_green" => color::BRIGHT_GREEN,
        "bright_yellow" => color::BRIGHT_YELLOW,
        "bright_blue" => color::BRIGHT_BLUE,
        "bright_magenta" => color::BRIGHT_MAGENTA,
        "bright_cyan" => color::BRIGHT_CYAN,
        "bright_white" => color::BRIGHT_WHITE,
        _ => return None,
    })
}

fn build_alias(raw: RawAlias) -> Result<Alias, String> {
    let pattern = Pattern::new(&raw.pattern).map_err(|e| e.to_string())?;
    let mut alias = Alias::new(raw.id, pattern, raw.priority);
    alias.enabled = raw.enabled;
    alias.commands = raw.commands;
    Ok(alias)
}

fn build_tab(raw: RawTab) -> Result<Tab, String> {
    let mut tab = Tab::new(raw.id, raw.max_lines);
    tab.capture_mode = match raw.capture_mode {
        RawCaptureMode::Copy => CaptureMode::Copy,
        RawCaptureMode::Move => CaptureMode::Move,
    };
    for f in raw.filters {
        let pattern = Pattern::new(&f.pattern).map_err(|e| e.to_string())?;
        tab.filters.push(TabFilter {
            pattern,
            replacement: f.replacement,
            match_on_colored_text: f.match_on_colored_text,
        });
    }
    Ok(tab)
}

fn build_context_rule(raw: RawContextRule) -> Result<ContextCommandRule, String> {
    let trigger = match raw.trigger {
        RawRuleTrigger::Tag(tag) if tag == "permanent" => RuleTrigger::Permanent,
        RawRuleTrigger::Tag(tag) => return Err(format!("unknown trigger tag '{tag}'")),
        RawRuleTrigger::Pattern { pattern } => {
            RuleTrigger::Pattern(Pattern::new(&pattern).map_err(|e| e.to_string())?)
        }
    };
    let scope = match raw.scope {
        RawScope::World => Scope::World,
        RawScope::Room { ids, tags } => Scope::Room { ids, tags },
        RawScope::Zone { names } => Scope::Zone { names },
    };
    let mut rule = ContextCommandRule::new(raw.id, trigger, scope, raw.command, raw.priority);
    rule.enabled = raw.enabled;
    Ok(rule)
}
