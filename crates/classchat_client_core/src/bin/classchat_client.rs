#![forbid(unsafe_code)]

use std::path::PathBuf;

use classchat_client_core::{
	ChatEngine, CommandError, EngineContext, EngineEvent, load_client_config, load_client_config_from_path,
};
use classchat_domain::{ChannelId, ChannelKind, MessageId, OriginClass};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: classchat_client --channel <id> [--kind classroom|discussion] [--config path]\n\
\n\
Options:\n\
	--channel   Channel to open (required)\n\
	--kind      Channel kind (default: classroom)\n\
	--config    Config file (default: ~/.classchat/config.toml)\n\
	--help      Show this help\n\
\n\
Input:\n\
	<text>              send a message\n\
	/edit <id> <text>   edit one of your messages\n\
	/delete <id>        delete one of your messages\n\
	/quit               close the channel and exit\n\
\n\
Examples:\n\
	CLASSCHAT_ACCESS_TOKEN=... CLASSCHAT_USER_ID=42 classchat_client --channel 7\n\
	classchat_client --channel 12 --kind discussion --config ./classchat.toml\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,classchat_client_core=debug"));
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

struct Args {
	channel: ChannelId,
	kind: ChannelKind,
	config: Option<PathBuf>,
}

fn parse_args() -> Args {
	let mut channel: Option<ChannelId> = None;
	let mut kind = ChannelKind::Classroom;
	let mut config: Option<PathBuf> = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--channel" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				channel = Some(ChannelId::new(v.as_str()).unwrap_or_else(|e| {
					eprintln!("Invalid --channel value: {v} ({e})");
					usage_and_exit()
				}));
			}
			"--kind" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				kind = v.parse().unwrap_or_else(|e| {
					eprintln!("Invalid --kind value: {v} ({e})");
					usage_and_exit()
				});
			}
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				config = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	let Some(channel) = channel else {
		eprintln!("--channel is required");
		usage_and_exit();
	};

	Args { channel, kind, config }
}

/// Returns false when the user asked to quit.
async fn handle_line(engine: &ChatEngine, line: &str) -> bool {
	let line = line.trim();
	if line.is_empty() {
		return true;
	}
	if line == "/quit" {
		return false;
	}

	let result: Result<(), CommandError> = if let Some(rest) = line.strip_prefix("/edit ") {
		match rest.trim().split_once(' ') {
			Some((id, text)) => match MessageId::new(id) {
				Ok(id) => engine.edit(id, text).await,
				Err(e) => Err(e.into()),
			},
			None => {
				eprintln!("usage: /edit <id> <text>");
				return true;
			}
		}
	} else if let Some(id) = line.strip_prefix("/delete ") {
		match MessageId::new(id) {
			Ok(id) => engine.delete(id).await,
			Err(e) => Err(e.into()),
		}
	} else {
		engine.send(line).await.map(|_| ())
	};

	if let Err(e) = result {
		warn!(error = %e, "command rejected");
	}
	true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let args = parse_args();

	let cfg = match &args.config {
		Some(path) => load_client_config_from_path(path)?,
		None => load_client_config()?,
	};
	let ctx = EngineContext::from_config(&cfg)?;
	let me = ctx.current_user.id.clone();

	let (engine, mut events) = ChatEngine::new(ctx);
	info!(channel = %args.channel, kind = %args.kind, user = %me, "opening channel");
	engine.select_channel(args.channel.clone(), args.kind).await;

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut printed = 0usize;

	loop {
		tokio::select! {
			ev = events.recv() => {
				let Some(ev) = ev else { break };
				match ev {
					EngineEvent::TimelineChanged { snapshot, .. } => {
						// a delete shrinks the snapshot; print it again from the top
						if snapshot.len() < printed {
							printed = 0;
						}
						for m in snapshot.iter().skip(printed) {
							let marker = match m.origin_class(&me) {
								OriginClass::Own => ">",
								OriginClass::Other => " ",
							};
							println!(
								"{marker} [{}] {} ({}): {} [{:?}]",
								m.timestamp.format("%H:%M:%S"),
								m.sender_display_name,
								m.id,
								m.content,
								m.delivery_state
							);
						}
						printed = snapshot.len();
					}
					EngineEvent::Connection { state, .. } => {
						info!(status = %state.status, retry = state.retry_count, error = ?state.last_error, "connection");
					}
					EngineEvent::HistoryFailed { error, .. } => {
						warn!(%error, "history unavailable");
					}
				}
			}

			line = lines.next_line() => {
				match line? {
					Some(line) => {
						if !handle_line(&engine, &line).await {
							break;
						}
					}
					None => break,
				}
			}
		}
	}

	engine.deselect().await;
	Ok(())
}
