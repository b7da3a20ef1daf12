// Command table: every verb the console knows locally, and the help topics.
//
// Routing is data. A verb maps to a `VerbRoute`; anything not in the map
// is forwarded to the service as a generic action. Help topics are keyed
// by (sub-verb, optional qualifier), so `help new object` and `help new user`
// can point at different places. Every entry is either inline markup or a
// documentation page to navigate to.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::router::Resource;

/// Format version of the command table. Bumped whenever the JSON shape
/// changes.
pub const TABLE_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerbRoute {
    /// `help` alone renders the summary, `help <topic>` looks up a topic.
    Help,
    /// Fixed text in another language. Never navigates.
    LocalizedHelp,
    Remote { resource: Resource },
    Navigate { target: String },
    ClearSession { redirect: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HelpEntry {
    Text(String),
    Navigate(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpTopic {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    pub entry: HelpEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTable {
    pub version: u32,
    pub summary: String,
    pub localized: String,
    pub verbs: BTreeMap<String, VerbRoute>,
    #[serde(default)]
    pub topics: Vec<HelpTopic>,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("cannot read command table: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse command table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported command table version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("verb {0:?} must be a single lowercase word")]
    BadVerb(String),
    #[error("navigation target for {0:?} must be an absolute path")]
    BadTarget(String),
}

impl CommandTable {
    /// Parses and validates a JSON command table.
    pub fn from_json(json: &str) -> Result<Self, TableError> {
        let table: CommandTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), TableError> {
        if self.version != TABLE_VERSION {
            return Err(TableError::Version {
                found: self.version,
                expected: TABLE_VERSION,
            });
        }
        for (verb, route) in &self.verbs {
            if verb.is_empty() || verb.contains(' ') || *verb != verb.to_lowercase() {
                return Err(TableError::BadVerb(verb.clone()));
            }
            let target = match route {
                VerbRoute::Navigate { target } => Some(target),
                VerbRoute::ClearSession { redirect } => Some(redirect),
                _ => None,
            };
            if target.is_some_and(|t| !t.starts_with('/')) {
                return Err(TableError::BadTarget(verb.clone()));
            }
        }
        for topic in &self.topics {
            if let HelpEntry::Navigate(target) = &topic.entry {
                if !target.starts_with('/') {
                    return Err(TableError::BadTarget(topic.sub.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn route(&self, verb: &str) -> Option<&VerbRoute> {
        self.verbs.get(verb)
    }

    /// Finds the help entry for `help <sub> [<qualifier>]`. A topic with a
    /// matching qualifier wins over the unqualified topic for the same sub-verb.
    pub fn topic(&self, sub: &str, qualifier: Option<&str>) -> Option<&HelpEntry> {
        let qualified = qualifier.and_then(|q| {
            self.topics
                .iter()
                .find(|t| t.sub == sub && t.qualifier.as_deref() == Some(q))
        });
        qualified
            .or_else(|| {
                self.topics
                    .iter()
                    .find(|t| t.sub == sub && t.qualifier.is_none())
            })
            .map(|t| &t.entry)
    }

    /// The table compiled into the binary.
    pub fn builtin() -> Self {
        let verbs = [
            ("help", VerbRoute::Help),
            ("помощь", VerbRoute::LocalizedHelp),
            (
                "history",
                VerbRoute::Remote {
                    resource: Resource::History,
                },
            ),
            (
                "servers",
                VerbRoute::Remote {
                    resource: Resource::Servers,
                },
            ),
            (
                "exit",
                VerbRoute::ClearSession {
                    redirect: "/exit".into(),
                },
            ),
            (
                "doc",
                VerbRoute::Navigate {
                    target: "/doc/".into(),
                },
            ),
        ]
        .into_iter()
        .map(|(verb, route)| (verb.to_string(), route))
        .collect();

        CommandTable {
            version: TABLE_VERSION,
            summary: SUMMARY.join("<br>"),
            localized: LOCALIZED.join("<br>"),
            verbs,
            topics: builtin_topics(),
        }
    }
}

const SUMMARY: &[&str] = &[
    "set key \"value\" [on server] [level level] - Sets the value to the storage.",
    "uset, rset, ruset - Unique, read-only and read-only unique set.",
    "get key [server] - Gets the value from the storage.",
    "del key [server] - Deletes the key.",
    "",
    "new object name [server] [s|r] - Creates an object.",
    "seto object key \"value\" [on server] - Sets a key inside an object.",
    "geto object [key] - Shows an object or gets one of its keys.",
    "delo object key - Deletes a key from an object.",
    "marshalo object [server] - Shows an object as JSON.",
    "attach dst src - Attaches object src to object dst.",
    "delete object name server - Deletes an object.",
    "",
    "new user name password [s|r] - Creates a user.",
    "delete user name - Deletes a user.",
    "change user.level user level - Changes the level of a user.",
    "change user.password user password - Changes the password of a user.",
    "add server address - Adds a storage server.",
    "",
    "history - history of user actions",
    "servers - list of active servers with stats",
    "doc - documentation",
    "exit - end the session",
    "help command [object|user] - details about a command",
];

const LOCALIZED: &[&str] = &[
    "set key \"value\" - Сохраняет значение в хранилище.",
    "get key [server] - Получает значение из хранилища.",
    "del key - Удаляет ключ.",
    "new object name - Создаёт объект.",
    "seto object key \"value\" - Сохраняет ключ в объекте.",
    "geto object [key] - Показывает объект или его ключ.",
    "",
    "history - история действий пользователя",
    "servers - список активных серверов",
    "doc - документация",
    "exit - завершить сессию",
];

const GET_HELP: &[&str] = &[
    "get key [server] - Gets the value from the storage.",
    "server > 0 - Search on a specific server. (speed: fast)",
    "server = 0 - DB search. (speed: medium)",
    "server = -1 (default) - Deep search. (speed: slow)",
];

const DEL_HELP: &[&str] = &[
    "del key [server] - Deletes the key.",
    "Without a server number the key is deleted wherever it is found.",
];

const GETO_HELP: &[&str] = &[
    "geto object - Shows every key of the object.",
    "geto object key - Gets a single key from the object.",
];

const LEVEL_HELP: &[&str] = &[
    "Levels:",
    "s - secret, readable by users with the secret level.",
    "r - restricted, readable by users with the restricted level or above.",
];

fn text(lines: &[&str]) -> HelpEntry {
    HelpEntry::Text(lines.join("<br>"))
}

fn builtin_topics() -> Vec<HelpTopic> {
    let topic = |sub: &str, qualifier: Option<&str>, entry: HelpEntry| HelpTopic {
        sub: sub.to_string(),
        qualifier: qualifier.map(str::to_string),
        entry,
    };
    let doc = |page: &str| HelpEntry::Navigate(format!("/doc/{page}"));

    vec![
        topic("set", None, doc("commands.html#set")),
        topic("uset", None, doc("commands.html#set")),
        topic("rset", None, doc("commands.html#set")),
        topic("ruset", None, doc("commands.html#set")),
        topic("get", None, text(GET_HELP)),
        topic("del", None, text(DEL_HELP)),
        topic("new", Some("object"), doc("objects.html#new-object")),
        topic("new", Some("user"), doc("acl.html#new-user")),
        topic("seto", None, doc("objects.html#seto")),
        topic("geto", None, text(GETO_HELP)),
        topic(
            "delo",
            None,
            text(&["delo object key - Deletes a key from an object."]),
        ),
        topic("marshalo", None, doc("objects.html#marshalo")),
        topic("attach", None, doc("objects.html#attach")),
        topic("delete", Some("object"), doc("objects.html#delete-object")),
        topic("delete", Some("user"), doc("acl.html#delete-user")),
        topic("change", None, doc("acl.html#change")),
        topic("level", None, text(LEVEL_HELP)),
        topic(
            "add",
            Some("server"),
            text(&["add server address - Registers a storage server with the balancer."]),
        ),
        topic(
            "history",
            None,
            text(&["history - Shows your previous commands, newest first."]),
        ),
        topic(
            "servers",
            None,
            text(&["servers - Lists active servers with RAM usage and object counts."]),
        ),
    ]
}
