use std::{collections::HashMap, fmt};

use crate::helpers::{self, MAX_MESSAGE_LEN};

/// Room left for the text of a `/me` line.
const MAX_NOTICE_LEN: usize = MAX_MESSAGE_LEN - "/me ".len();

#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    pub user: User,
    pub message: String,
}

impl Message {
    pub fn new(user: User, message: String) -> Self {
        Message { user, message }
    }
}

#[derive(Clone, Debug, Default)]
pub struct User {
    pub name: String,
    pub id: String,
    pub display_name: String,
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl User {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        User {
            name: name.into(),
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Builds a user from the IRCv3 tags of a PRIVMSG and the login taken from its prefix.
    pub fn from_tags(tags: &HashMap<String, String>, username: String) -> Self {
        let id = tags.get("user-id").cloned().unwrap_or_default();
        let display_name = match tags.get("display-name") {
            Some(name) if !name.is_empty() => name.clone(),
            _ => username.clone(),
        };

        User {
            name: username,
            id,
            display_name,
        }
    }

    /// Owner identity may be configured either as the login or as the numeric user ID.
    pub fn is(&self, identity: &str) -> bool {
        !identity.is_empty() && (self.name.eq_ignore_ascii_case(identity) || self.id == identity)
    }
}

/// Chat control vocabulary understood by Twitch chat.
#[derive(Clone, PartialEq, Debug)]
pub enum Directive {
    Color(String),
    Me(String),
    Slow(u32),
    UniqueChat,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Color(color) => write!(f, "/color {color}"),
            Directive::Me(text) => write!(f, "/me {text}"),
            Directive::Slow(seconds) => write!(f, "/slow {seconds}"),
            Directive::UniqueChat => write!(f, "/uniquechat"),
        }
    }
}

/// One outgoing chat line produced by the dispatcher.
#[derive(Clone, PartialEq, Debug)]
pub enum Reply {
    Say(String),
    /// A colored `/me` line, used for errors and notices.
    Notice { color: String, text: String },
}

impl Reply {
    /// Notices often echo what the user typed, so the text is cut to fit one chat line.
    pub fn notice(color: &str, text: impl Into<String>) -> Self {
        Reply::Notice {
            color: color.to_string(),
            text: helpers::truncate(&text.into(), MAX_NOTICE_LEN),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Reply::Say(text) => text,
            Reply::Notice { text, .. } => text,
        }
    }

    /// Expands the reply into the raw chat lines the transport writes.
    pub fn into_lines(self) -> Vec<String> {
        match self {
            Reply::Say(text) => vec![text],
            Reply::Notice { color, text } => vec![
                Directive::Color(color).to_string(),
                Directive::Me(text).to_string(),
            ],
        }
    }
}
