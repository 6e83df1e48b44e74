use std::{
    cell::RefCell,
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use anyhow::Result;
use gtmpl::{Func, FuncError, Value};
use rand::{rngs::StdRng, seq::SliceRandom, RngCore, SeedableRng};

use crate::{
    command::Snapshot,
    helpers::{self, MAX_MESSAGE_LEN},
    message::User,
    template::{self, text, RenderError},
};

/// Topic the marquee overlay listens on.
pub const MARQUEE_TOPIC: &str = "marquee_updated";

/// Read access to the channel roster.
pub trait Members: Send + Sync {
    fn members_sorted(&self) -> Vec<String>;
    /// When `name` was first seen in chat during this session.
    fn joined_at(&self, name: &str) -> Option<SystemTime>;
    /// URLs shared per user, for one user or for everyone.
    fn shared_urls(&self, name: Option<&str>) -> Vec<(String, Vec<String>)>;
}

/// Source of the "now playing" line.
pub trait NowPlaying: Send + Sync {
    fn current_track(&self) -> String;
}

/// Hands a message to the companion daemons. May fail or be slow.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, body: &str) -> Result<()>;
}

/// Stateful services templates can reach.
#[derive(Clone)]
pub struct Collaborators {
    pub roster: Arc<dyn Members>,
    pub player: Arc<dyn NowPlaying>,
    pub publisher: Arc<dyn Publisher>,
}

/// Named helpers callable from templates, on top of the `gtmpl` builtins.
pub struct FunctionTable {
    helpers: HashMap<&'static str, Func>,
}

impl FunctionTable {
    pub fn empty() -> Self {
        FunctionTable {
            helpers: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register("random", random);
        table.register("join", join);
        table.register("upper", |args| Ok(Value::from(single("upper", args)?.to_uppercase())));
        table.register("lower", |args| Ok(Value::from(single("lower", args)?.to_lowercase())));
        table.register("members", |args| {
            arity("members", args, 0)?;
            with_state(|state| Ok(Value::from(state.collaborators.roster.members_sorted())))
        });
        table
    }

    pub fn register(&mut self, name: &'static str, helper: Func) {
        self.helpers.insert(name, helper);
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, Func)> + '_ {
        self.helpers.iter().map(|(name, helper)| (*name, *helper))
    }
}

/// Everything a template may look at while one chat line is handled.
pub struct RenderContext<'a> {
    pub sender: &'a User,
    pub cmd_line: &'a str,
    pub extras: &'a [String],
    pub snapshot: &'a Arc<Snapshot>,
    pub collaborators: &'a Collaborators,
    pub functions: &'a FunctionTable,
    pub rng: &'a mut dyn RngCore,
}

impl RenderContext<'_> {
    pub fn render(&mut self, source: &str) -> Result<String, RenderError> {
        let state = RenderState {
            snapshot: Arc::clone(self.snapshot),
            collaborators: self.collaborators.clone(),
            rng: StdRng::seed_from_u64(self.rng.next_u64()),
        };
        let data = self.data();
        with_render_state(state, || template::render(source, self.functions.iter(), data))
    }

    /// The dot of every template.
    fn data(&self) -> Value {
        object([
            ("CmdLine", Value::from(self.cmd_line)),
            ("Commands", Value::from(self.snapshot.primary_aliases_sorted().join(" "))),
            ("Extras", Value::from(self.extras)),
            (
                "Sender",
                object([
                    ("Name", Value::from(&self.sender.name)),
                    ("ID", Value::from(&self.sender.id)),
                    ("DisplayName", Value::from(&self.sender.display_name)),
                ]),
            ),
            (
                "Roster",
                object([("Keys", Value::from(self.collaborators.roster.members_sorted()))]),
            ),
            ("Player", object([("CurrentSong", Value::from(current_song as Func))])),
            ("Command", command_methods()),
        ])
    }
}

fn object<const N: usize>(fields: [(&str, Value); N]) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

/// `.Command.*` fields evaluate to functions, so templates invoke them with
/// `call`, e.g. `{{call .Command.Help .CmdLine}}`.
fn command_methods() -> Value {
    let methods: [(&str, Func); 8] = [
        ("Help", |_| Ok(Value::from(help as Func))),
        ("LongHelp", |_| Ok(Value::from(long_help as Func))),
        ("Admin", |_| Ok(Value::from(admin as Func))),
        ("Upside", |_| Ok(Value::from(upside as Func))),
        ("Ban", |_| Ok(Value::from(ban as Func))),
        ("Uptime", |_| Ok(Value::from(uptime as Func))),
        ("Urls", |_| Ok(Value::from(urls as Func))),
        ("Marquee", |_| Ok(Value::from(marquee as Func))),
    ];
    object(methods.map(|(name, method)| (name, Value::from(method))))
}

/// What template helpers may touch while one render runs on this thread.
struct RenderState {
    snapshot: Arc<Snapshot>,
    collaborators: Collaborators,
    rng: StdRng,
}

thread_local! {
    static RENDER_STATE: RefCell<Option<RenderState>> = RefCell::new(None);
}

fn with_render_state<R>(state: RenderState, f: impl FnOnce() -> R) -> R {
    let previous = RENDER_STATE.with(|cell| cell.replace(Some(state)));
    let result = f();
    RENDER_STATE.with(|cell| cell.replace(previous));
    result
}

fn with_state<R>(f: impl FnOnce(&mut RenderState) -> Result<R, FuncError>) -> Result<R, FuncError> {
    RENDER_STATE.with(|cell| {
        let mut state = cell.borrow_mut();
        let state = state
            .as_mut()
            .ok_or_else(|| FuncError::Generic("helper called outside of a render".to_string()))?;
        f(state)
    })
}

fn arity(name: &str, args: &[Value], want: usize) -> Result<(), FuncError> {
    if args.len() == want {
        Ok(())
    } else {
        Err(FuncError::ExactlyXArgs(name.to_string(), want))
    }
}

fn single(name: &str, args: &[Value]) -> Result<String, FuncError> {
    arity(name, args, 1)?;
    Ok(text(&args[0]))
}

fn items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(text).collect(),
        Value::NoValue | Value::Nil => Vec::new(),
        other => vec![text(other)],
    }
}

fn random(args: &[Value]) -> Result<Value, FuncError> {
    arity("random", args, 1)?;
    let choices = items(&args[0]);
    with_state(|state| {
        choices
            .choose(&mut state.rng)
            .map(Value::from)
            .ok_or_else(|| FuncError::Generic("random needs at least one choice".to_string()))
    })
}

/// `join SEP LIST`, so it can sit at the end of a pipeline.
fn join(args: &[Value]) -> Result<Value, FuncError> {
    arity("join", args, 2)?;
    Ok(Value::from(items(&args[1]).join(&text(&args[0]))))
}

fn current_song(_: &[Value]) -> Result<Value, FuncError> {
    with_state(|state| Ok(Value::from(state.collaborators.player.current_track())))
}

fn help(args: &[Value]) -> Result<Value, FuncError> {
    let input = single("Help", args)?;
    with_state(|state| Ok(Value::from(state.snapshot.help_text(&input))))
}

fn long_help(args: &[Value]) -> Result<Value, FuncError> {
    let input = single("LongHelp", args)?;
    with_state(|state| Ok(Value::from(state.snapshot.long_help_text(&input))))
}

fn admin(args: &[Value]) -> Result<Value, FuncError> {
    let input = single("Admin", args)?;
    with_state(|state| Ok(Value::Bool(state.snapshot.is_admin(&input))))
}

fn upside(args: &[Value]) -> Result<Value, FuncError> {
    let input = single("Upside", args)?;
    if input.is_empty() {
        return with_state(|state| Ok(Value::from(state.snapshot.help_text("upside"))));
    }
    Ok(Value::from(helpers::upside_down(&input)))
}

/// Picks one of the extras and puts the target in place of `${target}`.
fn ban(args: &[Value]) -> Result<Value, FuncError> {
    arity("Ban", args, 2)?;
    let target = text(&args[0]);
    let extras = items(&args[1]);
    with_state(|state| {
        if target.is_empty() {
            return Ok(Value::from(state.snapshot.help_text("ban")));
        }
        let template = extras.choose(&mut state.rng).ok_or_else(|| {
            FuncError::Generic("no ban messages configured for this command".to_string())
        })?;
        Ok(Value::from(template.replace("${target}", &target)))
    })
}

fn uptime(args: &[Value]) -> Result<Value, FuncError> {
    let name = single("Uptime", args)?.trim().to_lowercase();
    with_state(|state| {
        if name.is_empty() {
            return Ok(Value::from(state.snapshot.help_text("uptime")));
        }
        let reply = match state.collaborators.roster.joined_at(&name) {
            Some(joined) => {
                let elapsed = joined.elapsed().unwrap_or(Duration::ZERO);
                format!("{name} joined {} ago", helpers::format_duration(elapsed))
            }
            None => format!("{name} has no join time... :("),
        };
        Ok(Value::from(reply))
    })
}

/// Shared URLs, one chat line per 500 bytes.
fn urls(args: &[Value]) -> Result<Value, FuncError> {
    let name = single("Urls", args)?.trim().to_lowercase();
    let filter = (!name.is_empty()).then_some(name.as_str());
    with_state(|state| {
        let shared = state.collaborators.roster.shared_urls(filter);
        if shared.is_empty() {
            let reply = match filter {
                Some(name) => format!("{name} hasn't shared any urls yet... :("),
                None => "Nobody shared any urls yet... :(".to_string(),
            };
            return Ok(Value::from(reply));
        }
        let listing = shared
            .iter()
            .map(|(user, urls)| format!("{user} shared: {}", urls.join(" ")))
            .collect::<Vec<_>>()
            .join(" - ");
        Ok(Value::from(helpers::word_wrap(&listing, MAX_MESSAGE_LEN).join("\n")))
    })
}

fn marquee(args: &[Value]) -> Result<Value, FuncError> {
    let body = single("Marquee", args)?;
    with_state(|state| {
        if body.is_empty() {
            return Ok(Value::from(state.snapshot.help_text("marquee")));
        }
        state
            .collaborators
            .publisher
            .publish(MARQUEE_TOPIC, &body)
            .map_err(|e| FuncError::Other(e.context("couldn't update the marquee")))?;
        Ok(Value::from(format!("Updating marquee: {body}")))
    })
}
