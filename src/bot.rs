use std::sync::Arc;

use anyhow::Result;
use rand::{rngs::StdRng, SeedableRng};
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::{
    command::Registry,
    config::Config,
    context::{Collaborators, Publisher},
    dispatch::Dispatcher,
    message::{Directive, Message, Reply},
    player::Player,
    publisher::{Disabled, SpoolPublisher},
    roster::{JsonFileStore, Roster, RosterStore},
    stream::{IrcEvent, Stream},
    token::Token,
    watcher::ReloadWatcher,
};

/// Why a connection ended without an error.
#[derive(Debug, PartialEq)]
enum Flow {
    Reconnect,
    Shutdown,
}

pub struct Bot {
    cfg: Config,
    token: Token,
    registry: Arc<Registry>,
    roster: Arc<Roster>,
    collaborators: Collaborators,
    dispatcher: Dispatcher,
    rng: StdRng,
    _watcher: ReloadWatcher,
}

impl Bot {
    pub async fn initialize(cfg: Config) -> Result<Self> {
        let token = Token::from_file(&cfg.twitch_cfg.token_path)?;
        let registry = Arc::new(Registry::load(&cfg.bot_cfg.commands_path)?);
        let debounce = cfg.bot_cfg.reload_debounce();
        let watcher = ReloadWatcher::spawn(Arc::clone(&registry), debounce)?;

        let store = cfg
            .bot_cfg
            .roster_path
            .as_ref()
            .map(|path| Box::new(JsonFileStore::new(path)) as Box<dyn RosterStore>);
        let roster = Arc::new(Roster::new(store));

        let publisher: Arc<dyn Publisher> = match &cfg.bot_cfg.publish_dir {
            Some(dir) => Arc::new(SpoolPublisher::new(dir)),
            None => Arc::new(Disabled),
        };
        let collaborators = Collaborators {
            roster: roster.clone(),
            player: Arc::new(Player::new(cfg.bot_cfg.now_playing_path.clone())),
            publisher,
        };

        Ok(Bot {
            token,
            roster,
            collaborators,
            dispatcher: Dispatcher::new(cfg.twitch_cfg.owner()),
            rng: StdRng::from_entropy(),
            registry,
            _watcher: watcher,
            cfg,
        })
    }

    /// Serves chat until ctrl-c, reconnecting whenever the connection drops.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let flow = match self.connect().await {
                Ok(mut stream) => self.serve(&mut stream).await,
                Err(e) => Err(e),
            };

            self.roster.clear();
            match flow {
                Ok(Flow::Shutdown) => return Ok(()),
                Ok(Flow::Reconnect) => info!("server asked us to reconnect"),
                Err(e) => {
                    error!("chat connection failed: {e:#}");
                    if self.wait_to_reconnect().await == Flow::Shutdown {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn connect(&mut self) -> Result<Stream> {
        // the token file may have been refreshed by another process
        match Token::from_file(&self.cfg.twitch_cfg.token_path) {
            Ok(token) => self.token = token,
            Err(e) => warn!("keeping previous token: {e:#}"),
        }

        let twitch = &self.cfg.twitch_cfg;
        let mut stream =
            Stream::new(&twitch.irc_host, twitch.irc_port, twitch.channel.clone()).await?;
        stream.connect_to_irc(&twitch.account, &self.token.access_token).await?;
        info!(channel = %twitch.channel, account = %twitch.account, "connected to chat");

        self.greet(&mut stream).await?;
        Ok(stream)
    }

    async fn greet(&self, stream: &mut Stream) -> Result<()> {
        let bot_cfg = &self.cfg.bot_cfg;
        if !bot_cfg.greeting.is_empty() {
            stream
                .send_reply(Reply::notice(&bot_cfg.greeting_color, bot_cfg.greeting.clone()))
                .await?;
        }
        if bot_cfg.unique_chat {
            stream.send_directive(Directive::UniqueChat).await?;
        }
        if let Some(seconds) = bot_cfg.slow_mode_secs {
            stream.send_directive(Directive::Slow(seconds)).await?;
        }
        Ok(())
    }

    async fn serve(&mut self, stream: &mut Stream) -> Result<Flow> {
        loop {
            let event = tokio::select! {
                event = stream.next_event() => event?,
                _ = signal::ctrl_c() => {
                    info!("shutting down");
                    return Ok(Flow::Shutdown);
                }
            };

            match event {
                IrcEvent::Privmsg(message) => self.handle_message(stream, message).await?,
                IrcEvent::Join(name) => self.roster.add_user(&name),
                IrcEvent::Part(name) => self.roster.remove_user(&name),
                IrcEvent::Names(names) => {
                    for name in &names {
                        self.roster.add_user(name);
                    }
                }
                IrcEvent::Reconnect => return Ok(Flow::Reconnect),
                IrcEvent::Ping(_) | IrcEvent::Other => {}
            }
        }
    }

    async fn handle_message(&mut self, stream: &mut Stream, message: Message) -> Result<()> {
        if self.cfg.bot_cfg.ignored_senders.contains(&message.user.id) {
            debug!(user = %message.user.name, "ignored sender");
            return Ok(());
        }

        self.roster.record_urls(&message.user.name, &message.message);

        let snapshot = self.registry.snapshot();
        let outcome = self
            .dispatcher
            .dispatch(&snapshot, &message, &self.collaborators, &mut self.rng);

        for log in &outcome.logs {
            info!(target: "command_log", user = %message.user.name, "{log}");
        }
        for reply in outcome.replies {
            stream.send_reply(reply).await?;
        }
        Ok(())
    }

    async fn wait_to_reconnect(&self) -> Flow {
        let delay = self.cfg.bot_cfg.reconnect_delay();
        info!("reconnecting in {delay:?}");
        tokio::select! {
            _ = tokio::time::sleep(delay) => Flow::Reconnect,
            _ = signal::ctrl_c() => Flow::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::context::Members;

    const SCRIPT: &str = "\
:bot.tmi.twitch.tv 353 bot = #streamer :ana bia\r\n\
:zed!zed@zed.tmi.twitch.tv JOIN #streamer\r\n\
@user-id=105166207;display-name=Streamlabs \
:streamlabs!streamlabs@streamlabs.tmi.twitch.tv PRIVMSG #streamer :!ping\r\n\
@user-id=77;display-name=Ana :ana!ana@ana.tmi.twitch.tv PRIVMSG #streamer :!ping\r\n\
@user-id=78;display-name=Bia :bia!bia@bia.tmi.twitch.tv PRIVMSG #streamer :!who\r\n\
@user-id=78;display-name=Bia :bia!bia@bia.tmi.twitch.tv PRIVMSG #streamer :olha https://bia.dev\r\n\
@user-id=78;display-name=Bia :bia!bia@bia.tmi.twitch.tv PRIVMSG #streamer :!links\r\n\
:bia!bia@bia.tmi.twitch.tv PART #streamer\r\n";

    const COMMANDS: &str = r#"
commands:
  - actions: ["!ping"]
    responses: ["pong"]
  - actions: ["!who"]
    responses: ["{{join \" \" .Roster.Keys}}"]
  - actions: ["!links"]
    responses: ["{{call .Command.Urls .CmdLine}}"]
"#;

    #[tokio::test]
    async fn greets_and_answers_chat() {
        let dir = tempfile::tempdir().expect("tempdir");
        let commands_path = dir.path().join("commands.yaml");
        std::fs::write(&commands_path, COMMANDS).expect("commands");
        let token_path = dir.path().join("token.json");
        std::fs::write(&token_path, r#"{"access_token":"secret"}"#).expect("token");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let mut cfg = Config::default();
        cfg.twitch_cfg.irc_host = "127.0.0.1".to_string();
        cfg.twitch_cfg.irc_port = listener.local_addr().expect("addr").port();
        cfg.twitch_cfg.account = "bot".to_string();
        cfg.twitch_cfg.channel = "streamer".to_string();
        cfg.twitch_cfg.token_path = token_path.to_string_lossy().to_string();
        cfg.bot_cfg.commands_path = commands_path;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            socket.write_all(SCRIPT.as_bytes()).await.expect("write");
            socket.shutdown().await.expect("shutdown");
            let mut received = String::new();
            socket.read_to_string(&mut received).await.expect("read");
            received
        });

        let mut bot = Bot::initialize(cfg).await.expect("bot");
        let mut stream = bot.connect().await.expect("connect");
        let ended = bot.serve(&mut stream).await;
        assert!(ended.is_err(), "server hung up, serve should report it");
        drop(stream);

        let received = server.await.expect("server");
        let sent: Vec<&str> = received
            .split("\r\n")
            .filter(|line| line.starts_with("PRIVMSG"))
            .collect();
        assert_eq!(
            sent,
            vec![
                "PRIVMSG #streamer :/color seagreen",
                "PRIVMSG #streamer :/me Tô na área!",
                "PRIVMSG #streamer :/uniquechat",
                "PRIVMSG #streamer :pong",
                "PRIVMSG #streamer :ana bia zed",
                "PRIVMSG #streamer :bia shared: https://bia.dev",
            ]
        );
        assert_eq!(bot.roster.members_sorted(), vec!["ana", "zed"]);
    }
}
