//! Entry point for the droidtop CLI. Parses args, resolves the bridge URL,
//! and runs the poll loop, logging one summary line per applied poll.

use std::env;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tokio::time::MissedTickBehavior;
use tracing::info;

use droidtop::monitor::{Monitor, TickOutcome};
use droidtop::probe::WsProbe;
use droidtop::profiles::{
    load_profiles, save_profiles, ProfileEntry, ResolveTarget, TargetRequest,
};
use droidtop::ws::validate_url;

struct ParsedArgs {
    url: Option<String>,
    profile: Option<String>,
    save: bool,
    interval_ms: Option<u64>,
    json: bool,
    dry_run: bool,
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--profile NAME|-P NAME] [--save] [--interval-ms MS|-i MS] [--json] [--dry-run] [ws://HOST:PORT/shell]"
    )
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "droidtop".into());
    let mut url: Option<String> = None;
    let mut profile: Option<String> = None;
    let mut save = false;
    let mut interval_ms: Option<u64> = None;
    let mut json = false;
    let mut dry_run = false;

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                return Err(usage(&prog));
            }
            "--profile" | "-P" => {
                profile = it.next();
            }
            "--save" => {
                save = true;
            }
            "--json" => {
                json = true;
            }
            "--dry-run" => {
                dry_run = true;
            }
            "--interval-ms" | "-i" => {
                let v = it
                    .next()
                    .ok_or_else(|| format!("--interval-ms needs a value\n{}", usage(&prog)))?;
                interval_ms =
                    Some(v.parse().map_err(|_| format!("invalid --interval-ms '{v}'"))?);
            }
            _ if arg.starts_with("--profile=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        profile = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--interval-ms=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    interval_ms =
                        Some(v.parse().map_err(|_| format!("invalid --interval-ms '{v}'"))?);
                }
            }
            _ => {
                if url.is_none() && !arg.starts_with('-') {
                    url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument '{arg}'. {}", usage(&prog)));
                }
            }
        }
    }
    Ok(ParsedArgs {
        url,
        profile,
        save,
        interval_ms,
        json,
        dry_run,
    })
}

// Default cadence, overridable once per process via DROIDTOP_POLL_MS
fn default_interval_ms() -> u64 {
    static MS: OnceCell<u64> = OnceCell::new();
    *MS.get_or_init(|| {
        std::env::var("DROIDTOP_POLL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("droidtop=info")),
        )
        .with_target(false)
        .init();

    // Resolve the bridge URL from args + stored profiles
    let mut profiles = load_profiles();
    let req = TargetRequest {
        profile_name: parsed.profile.clone(),
        url: parsed.url.clone(),
    };
    let url = match req.resolve(&profiles) {
        ResolveTarget::Direct(url) => {
            if let Some(name) = parsed.profile.as_ref() {
                let entry = ProfileEntry { url: url.clone() };
                let known = profiles.profiles.get(name);
                // New profiles save immediately; changed ones only with --save
                if known.is_none() || (parsed.save && known != Some(&entry)) {
                    profiles.profiles.insert(name.clone(), entry);
                    let _ = save_profiles(&profiles);
                }
            }
            url
        }
        ResolveTarget::Loaded(url) => url,
        ResolveTarget::Unknown(name) => {
            eprintln!("Unknown profile '{name}'. Pass a URL once to create it.");
            return Ok(());
        }
        ResolveTarget::None => {
            eprintln!("No bridge URL given.\n{}", usage("droidtop"));
            return Ok(());
        }
    };

    let url = match validate_url(&url) {
        Ok(u) => u.to_string(),
        Err(e) => {
            eprintln!("{e}");
            return Ok(());
        }
    };

    if parsed.dry_run {
        println!("target: {url}");
        return Ok(());
    }

    let interval = Duration::from_millis(parsed.interval_ms.unwrap_or_else(default_interval_ms));
    let mut monitor = Monitor::new(WsProbe::new(), interval);
    let handle = monitor.handle();
    handle.set_active_device(Some(url.clone()));
    info!("polling {url} every {}ms", interval.as_millis());

    let mut ticks = tokio::time::interval(interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticks.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                handle.set_active_device(None);
                info!("stopped");
                break;
            }
        }
        if monitor.tick().await == TickOutcome::Applied {
            let d = handle.derived();
            if parsed.json {
                println!("{}", serde_json::to_string(&d)?);
            } else {
                info!(
                    "cpu {:>3}% | mem {:>3}% ({}) | fps {:>3} | up {} | fg {}",
                    d.cpu_overall_pct,
                    d.memory_pct,
                    d.memory_used_label,
                    d.fps,
                    d.uptime_label,
                    d.foreground_app
                );
            }
        }
    }

    Ok(())
}
