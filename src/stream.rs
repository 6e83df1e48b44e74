use std::{collections::HashMap, fmt::Display};

use anyhow::{bail, Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
};
use tracing::{debug, trace, warn};

use crate::message::{Directive, Message, Reply, User};

const CAPABILITIES: &str = "twitch.tv/membership twitch.tv/tags twitch.tv/commands";
const NAMES_REPLY: &str = "353";

/// What a single IRC line meant for the bot.
#[derive(Clone, PartialEq, Debug)]
pub enum IrcEvent {
    Ping(String),
    Privmsg(Message),
    Join(String),
    Part(String),
    /// Logins from a NAMES reply (353).
    Names(Vec<String>),
    /// Twitch is about to drop the connection.
    Reconnect,
    Other,
}

// Stream is interpreted as an IRC stream
pub struct Stream {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    channel: String,
}

impl Stream {
    pub async fn new(host: &str, port: u16, channel: String) -> Result<Self> {
        let socket = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("couldn't connect to {host}:{port}"))?;
        let (reader, writer) = socket.into_split();

        Ok(Stream {
            lines: BufReader::new(reader).lines(),
            writer,
            channel,
        })
    }

    pub async fn connect_to_irc(&mut self, account: &str, access_token: &str) -> Result<()> {
        self.write_line(&format!("PASS oauth:{access_token}")).await?;
        self.write_line(&format!("NICK {account}")).await?;
        self.write_line(&format!("CAP REQ :{CAPABILITIES}")).await?;
        self.write_line(&format!("JOIN #{}", self.channel)).await?;
        Ok(())
    }

    /// Waits for the next line worth handling. PINGs are answered here.
    pub async fn next_event(&mut self) -> Result<IrcEvent> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                bail!("connection closed by server");
            };
            trace!(line, "irc");

            match parse_line(&line) {
                IrcEvent::Ping(answer) => self.pong(&answer).await,
                IrcEvent::Other => continue,
                event => return Ok(event),
            }
        }
    }

    pub async fn send_chat_message<T: Display>(&mut self, message: T) -> Result<()> {
        let line = format!("PRIVMSG #{} :{}", self.channel, message);
        self.write_line(&line)
            .await
            .context("failed to send chat message")
    }

    pub async fn send_directive(&mut self, directive: Directive) -> Result<()> {
        self.send_chat_message(directive).await
    }

    pub async fn send_reply(&mut self, reply: Reply) -> Result<()> {
        for line in reply.into_lines() {
            self.send_chat_message(line).await?;
        }
        Ok(())
    }

    async fn pong(&mut self, answer: &str) {
        debug!("pinged");
        if let Err(e) = self.write_line(&format!("PONG {answer}")).await {
            warn!("couldn't ping back: {e}");
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }
}

/// Classifies one raw IRC line, with or without IRCv3 tags.
pub fn parse_line(raw: &str) -> IrcEvent {
    let raw = raw.trim_end_matches(['\r', '\n']);
    let (tags, rest) = match raw.strip_prefix('@') {
        Some(tagged) => match tagged.split_once(' ') {
            Some((tags, rest)) => (parse_tags(tags), rest),
            None => return IrcEvent::Other,
        },
        None => (HashMap::new(), raw),
    };

    if let Some(answer) = rest.strip_prefix("PING ") {
        return IrcEvent::Ping(answer.to_string());
    }

    let Some((prefix, rest)) = rest.strip_prefix(':').and_then(|r| r.split_once(' ')) else {
        return IrcEvent::Other;
    };
    let nick = prefix.split('!').next().unwrap_or_default().to_string();
    let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));

    match command {
        "PRIVMSG" => {
            let Some((_, text)) = params.split_once(" :") else {
                return IrcEvent::Other;
            };
            // 7TV and Chatterino append this to dodge duplicate-message checks
            let text = text.replace(" \u{e0000}", "").trim_end().to_string();
            IrcEvent::Privmsg(Message::new(User::from_tags(&tags, nick), text))
        }
        "JOIN" => IrcEvent::Join(nick),
        "PART" => IrcEvent::Part(nick),
        NAMES_REPLY => match params.split_once(" :") {
            Some((_, names)) => {
                IrcEvent::Names(names.split_whitespace().map(str::to_string).collect())
            }
            None => IrcEvent::Other,
        },
        "RECONNECT" => IrcEvent::Reconnect,
        _ => IrcEvent::Other,
    }
}

fn parse_tags(tags: &str) -> HashMap<String, String> {
    tags.split(';')
        .filter_map(|tag| {
            let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
            (!key.is_empty()).then(|| (key.to_string(), unescape_tag(value)))
        })
        .collect()
}

fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
