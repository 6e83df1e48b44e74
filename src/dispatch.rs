use std::sync::Arc;

use rand::RngCore;
use tracing::{debug, warn};

use crate::{
    command::{Snapshot, MARKER},
    context::{Collaborators, FunctionTable, RenderContext},
    helpers::{self, MAX_MESSAGE_LEN},
    message::{Message, Reply},
    template::RenderError,
};

pub const ERROR_COLOR: &str = "red";
pub const NOTICE_COLOR: &str = "firebrick";

/// What one chat line turned into.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    /// Lines for the chat, in order.
    pub replies: Vec<Reply>,
    /// Rendered log templates; never sent to chat.
    pub logs: Vec<String>,
}

pub struct Dispatcher {
    owner: String,
    functions: FunctionTable,
}

struct Request<'a> {
    snapshot: &'a Arc<Snapshot>,
    message: &'a Message,
    cmd_line: &'a str,
    collaborators: &'a Collaborators,
}

impl Dispatcher {
    pub fn new(owner: impl Into<String>) -> Self {
        Self::with_functions(owner, FunctionTable::standard())
    }

    pub fn with_functions(owner: impl Into<String>, functions: FunctionTable) -> Self {
        Dispatcher {
            owner: owner.into(),
            functions,
        }
    }

    pub fn dispatch(
        &self,
        snapshot: &Arc<Snapshot>,
        message: &Message,
        collaborators: &Collaborators,
        rng: &mut dyn RngCore,
    ) -> Outcome {
        let mut outcome = Outcome::default();
        let text = message.message.as_str();
        if !text.starts_with(MARKER) || text.len() == MARKER.len_utf8() {
            return outcome;
        }

        let (action, cmd_line) = text.split_once(' ').unwrap_or((text, ""));

        let Some(command) = snapshot.lookup(action) else {
            if !snapshot.is_ignored(text) {
                debug!(action, "unknown command");
                outcome
                    .replies
                    .push(Reply::notice(NOTICE_COLOR, format!("I don't know this one: {text}")));
            }
            return outcome;
        };

        if command.admin && !message.user.is(&self.owner) {
            debug!(action, user = %message.user.name, "refused admin command");
            outcome.replies.push(Reply::notice(
                NOTICE_COLOR,
                format!("{action} is reserved for the channel owner"),
            ));
            return outcome;
        }

        let request = Request {
            snapshot,
            message,
            cmd_line,
            collaborators,
        };

        for response in &command.responses {
            match self.render(&request, response, &command.extras, rng) {
                Ok(rendered) => push_lines(&mut outcome.replies, &rendered),
                Err(e) => {
                    warn!(action, "response template failed: {e}");
                    let reason = helpers::capitalize_first(e.reason());
                    outcome.replies = vec![Reply::notice(ERROR_COLOR, reason)];
                    return outcome;
                }
            }
        }

        for log in &command.logs {
            match self.render(&request, log, &[], rng) {
                Ok(rendered) => outcome.logs.push(rendered),
                Err(e) => warn!(action, "log template failed: {e}"),
            }
        }

        outcome
    }

    fn render(
        &self,
        request: &Request<'_>,
        source: &str,
        extras: &[String],
        rng: &mut dyn RngCore,
    ) -> Result<String, RenderError> {
        let mut ctx = RenderContext {
            sender: &request.message.user,
            cmd_line: request.cmd_line,
            extras,
            snapshot: request.snapshot,
            collaborators: request.collaborators,
            functions: &self.functions,
            rng,
        };
        ctx.render(source)
    }
}

/// One reply per non-empty line, wrapped to the chat length limit.
fn push_lines(replies: &mut Vec<Reply>, rendered: &str) {
    for line in rendered.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let wrapped = helpers::word_wrap(line, MAX_MESSAGE_LEN);
        replies.extend(wrapped.into_iter().map(Reply::Say));
    }
}
