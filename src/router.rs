// Command router: turns a submitted line into an `Effect`.
//
// The router is pure. It never touches the network, the terminal or the
// cookie store. The console decides how to carry out each effect, which
// keeps every routing rule testable with plain strings.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::CommandLine;
use crate::help::{CommandTable, HelpEntry, VerbRoute};

/// Fixed resources of the web front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    History,
    Servers,
    Act,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Resource::History => "/history",
            Resource::Servers => "/servers",
            Resource::Act => "/act",
        }
    }
}

/// A request to one of the fixed resources. `action` is only set for
/// `/act` and holds the original line, unencoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub resource: Resource,
    pub action: Option<String>,
}

impl RemoteCall {
    pub fn named(resource: Resource) -> Self {
        RemoteCall {
            resource,
            action: None,
        }
    }

    pub fn act(line: &str) -> Self {
        RemoteCall {
            resource: Resource::Act,
            action: Some(line.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    LocalRender(String),
    /// Leave the console for a path on the web front-end.
    Navigate(String),
    RemoteCall(RemoteCall),
    /// Expire every session cookie, then navigate to `redirect`.
    ClearSession { redirect: String },
}

pub struct Router {
    table: CommandTable,
}

impl Router {
    pub fn new(table: CommandTable) -> Self {
        Router { table }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Classifies one submitted line. Blank lines produce no effect.
    pub fn handle_submit(&self, line: &str) -> Option<Effect> {
        let cmd = CommandLine::parse(line)?;
        let verb = cmd.verb();

        let effect = match self.table.route(&verb) {
            Some(VerbRoute::Help) => self.help(&cmd),
            Some(VerbRoute::LocalizedHelp) => Effect::LocalRender(self.table.localized.clone()),
            Some(VerbRoute::Remote { resource }) => match resource {
                Resource::Act => Effect::RemoteCall(RemoteCall::act(line)),
                named => Effect::RemoteCall(RemoteCall::named(*named)),
            },
            Some(VerbRoute::Navigate { target }) => Effect::Navigate(target.clone()),
            Some(VerbRoute::ClearSession { redirect }) => Effect::ClearSession {
                redirect: redirect.clone(),
            },
            None => Effect::RemoteCall(RemoteCall::act(line)),
        };

        debug!(verb = %verb, "routed command");
        Some(effect)
    }

    fn help(&self, cmd: &CommandLine<'_>) -> Effect {
        let Some(sub) = cmd.sub_verb() else {
            return Effect::LocalRender(self.table.summary.clone());
        };
        let qualifier = cmd.qualifier();

        match self.table.topic(&sub, qualifier.as_deref()) {
            Some(HelpEntry::Text(text)) => Effect::LocalRender(text.clone()),
            Some(HelpEntry::Navigate(target)) => Effect::Navigate(target.clone()),
            None => {
                let topic = cmd.tokens()[1..].join(" ");
                Effect::LocalRender(format!(
                    "no help available for \"{topic}\", type help for the list of commands"
                ))
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Router::new(CommandTable::builtin())
    }
}
