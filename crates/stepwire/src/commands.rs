//! Subcommand implementations. Pages come from a local file or an HTTP
//! fetch and are hosted in the in-memory session; everything else is a thin
//! layer over the core and engine crates.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde_json::json;
use stepwire_core::query::{decode_segment, split_segments};
use stepwire_core::selector::query_all;
use stepwire_core::synthesize::{describe, Synthesizer};
use stepwire_core::{Action, Locator, NodeId, Step};
use stepwire_engine::config::ConfigLoader;
use stepwire_engine::link::{build_link, AllowList};
use stepwire_engine::replay::{ReplayController, ReplaySummary, StepOutcome};
use stepwire_engine::session::PageSession;
use stepwire_page::{parse_document, Activity, SimSession};
use tracing::debug;

use crate::{AllowAction, PageArgs};

/// The query component of a link; a bare query string passes through.
fn query_of(link: &str) -> &str {
    match link.split_once('?') {
        Some((_, query)) => query,
        None => link,
    }
}

pub fn plan(link: &str, json: bool) -> Result<()> {
    let query = query_of(link);
    let mut rows = Vec::new();
    for (index, segment) in split_segments(query).enumerate() {
        rows.push((index, decode_segment(segment)));
    }
    if json {
        let steps: Vec<serde_json::Value> = rows
            .iter()
            .map(|(index, decoded)| match decoded {
                Ok((key, value)) => {
                    let mut entry = step_json(&Step::classify(key, value));
                    entry["index"] = json!(index);
                    entry
                }
                Err(error) => json!({ "index": index, "kind": "dropped", "error": error.to_string() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("(no steps)");
        return Ok(());
    }
    for (index, decoded) in rows {
        let line = match decoded {
            Ok((key, value)) => step_line(&Step::classify(&key, &value)),
            Err(error) => format!("dropped, malformed segment ({error})"),
        };
        println!("{index:>3}  {line}");
    }
    Ok(())
}

fn step_line(step: &Step) -> String {
    match step {
        Step::Blank => "blank key (counted, skipped)".to_string(),
        Step::Wait {
            delay: Some(delay), ..
        } => format!("wait {}ms", delay.as_millis()),
        Step::Wait { delay: None, raw } => {
            format!("wait with malformed payload {raw:?} (no delay)")
        }
        Step::PressEnter => "press Enter on the last injected element".to_string(),
        Step::Target {
            locator,
            action: Action::Click,
        } => format!("click {locator}"),
        Step::Target {
            locator,
            action: Action::Inject(text),
        } => format!("inject {text:?} into {locator}"),
    }
}

fn step_json(step: &Step) -> serde_json::Value {
    match step {
        Step::Blank => json!({ "kind": "blank" }),
        Step::Wait {
            delay: Some(delay), ..
        } => json!({ "kind": "wait", "millis": delay.as_millis() as u64 }),
        Step::Wait { delay: None, raw } => json!({ "kind": "wait", "malformed": raw }),
        Step::PressEnter => json!({ "kind": "press_enter" }),
        Step::Target {
            locator,
            action: Action::Click,
        } => json!({ "kind": "click", "locator": locator.encode() }),
        Step::Target {
            locator,
            action: Action::Inject(text),
        } => json!({ "kind": "inject", "locator": locator.encode(), "value": text }),
    }
}

pub fn encode(base: &str, raw_steps: &[String]) -> Result<()> {
    let steps: Vec<Step> = raw_steps.iter().map(|raw| parse_raw_step(raw)).collect();
    let link = build_link(base, &steps)?;
    println!("{link}");
    Ok(())
}

fn parse_raw_step(raw: &str) -> Step {
    let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
    Step::classify(key, value)
}

/// Loads the page named by `--html` or `--url`, returning its URL and markup.
async fn load_page(page: PageArgs) -> Result<(String, String)> {
    if let Some(path) = page.html {
        let html = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let url = match path.canonicalize() {
            Ok(abs) => url::Url::from_file_path(&abs)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| format!("file://{}", abs.display())),
            Err(_) => format!("file://{}", path.display()),
        };
        return Ok((url, html));
    }
    if let Some(url) = page.url {
        debug!(url, "fetching page");
        let html = reqwest::get(&url)
            .await?
            .error_for_status()?
            .text()
            .await?;
        return Ok((url, html));
    }
    bail!("provide a page with --html <file> or --url <url>")
}

pub async fn capture(
    page: PageArgs,
    pick: &str,
    base: Option<&str>,
    value: Option<String>,
    click: bool,
    json: bool,
) -> Result<()> {
    let (_url, html) = load_page(page).await?;
    let doc = parse_document(&html);
    let matches =
        query_all(&doc, pick).map_err(|error| anyhow::anyhow!("invalid --pick selector: {error}"))?;
    let picked = *matches
        .first()
        .with_context(|| format!("nothing on the page matches `{pick}`"))?;

    let config = ConfigLoader::load_default().await?;
    let synthesizer = Synthesizer::with_id_filter(config.id_filter());
    let result = synthesizer.identify(&doc, picked)?;

    let link = match (&result.locator, base) {
        (Some(locator), Some(base)) if click || value.is_some() => {
            let action = if click {
                Action::Click
            } else {
                Action::Inject(value.clone().unwrap_or_default())
            };
            Some(build_link(
                base,
                &[Step::Target {
                    locator: locator.clone(),
                    action,
                }],
            )?)
        }
        _ => None,
    };

    if json {
        let output = json!({
            "description": result.description,
            "strategy": result.strategy,
            "locator": result.locator.as_ref().map(Locator::encode),
            "link": link,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    println!("element:  {}", result.description);
    match &result.locator {
        Some(locator) => {
            println!("strategy: {}", result.strategy.unwrap_or("unknown"));
            println!("locator:  {}", locator.encode());
        }
        None => println!("no stable locator: every identification strategy failed"),
    }
    if let Some(link) = link {
        println!("link:     {link}");
    }
    Ok(())
}

pub async fn replay(page: PageArgs, link: &str, gated: bool, json: bool) -> Result<()> {
    let (url, html) = load_page(page).await?;
    if gated {
        let path = AllowList::default_path().context("no home directory for the allowlist")?;
        let list = AllowList::load(&path).await?;
        if !list.permits(&url) {
            bail!("{url} is not covered by the allowlist; add it with `stepwire allow add`");
        }
    }
    let config = ConfigLoader::load_default().await?;
    let session = SimSession::new();
    session.load(&url, &html);

    let query = query_of(link).to_string();
    let summary = ReplayController::new(&session, config.replay_options())
        .run(&query)
        .await;

    if json {
        let output = json!({ "summary": summary, "activity": session.activities() });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    print_summary(&summary);
    print_activity(&session);
    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    if !summary.ran {
        println!("replay skipped: this page load already replayed");
        return;
    }
    println!("steps:");
    for step in &summary.steps {
        println!("{:>3}  {}", step.index, outcome_line(&step.outcome));
    }
}

fn outcome_line(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::SkippedMalformed { error } => format!("dropped malformed segment ({error})"),
        StepOutcome::SkippedBlank => "blank key, skipped".to_string(),
        StepOutcome::Waited { millis } => format!("waited {millis}ms"),
        StepOutcome::WaitIgnored { raw } => format!("wait ignored, malformed payload {raw:?}"),
        StepOutcome::EnterPressed => "pressed Enter".to_string(),
        StepOutcome::EnterSkipped => "press-enter skipped, no prior injection".to_string(),
        StepOutcome::EnterFailed => "press-enter failed after key-down".to_string(),
        StepOutcome::NotFound { locator } => format!("{locator}: element never appeared"),
        StepOutcome::Clicked { locator } => format!("{locator}: clicked"),
        StepOutcome::ClickFailed { locator } => format!("{locator}: click failed"),
        StepOutcome::Injected { locator } => format!("{locator}: injected"),
        StepOutcome::InjectFailed { locator } => format!("{locator}: injection failed"),
    }
}

fn print_activity(session: &SimSession) {
    let activities = session.activities();
    if activities.is_empty() {
        println!("(no page activity)");
        return;
    }
    println!("page activity:");
    for activity in activities {
        let line = match activity {
            Activity::ValueSet { node, value } => {
                format!("set value {:?} on {}", value, label(session, node))
            }
            Activity::TextSet { node, text } => {
                format!("set text {:?} on {}", text, label(session, node))
            }
            Activity::OptionChosen { node, index } => {
                format!("chose option {} of {}", index, label(session, node))
            }
            Activity::Event { node, event } => match event.key_code {
                Some(code) => format!(
                    "{:?} (key {}) on {}",
                    event.kind,
                    code,
                    label(session, node)
                ),
                None => format!("{:?} on {}", event.kind, label(session, node)),
            },
            Activity::Clicked { node } => format!("clicked {}", label(session, node)),
            Activity::Navigated { url } => format!("navigated to {url}"),
        };
        println!("  {line}");
    }
}

fn label(session: &SimSession, node: NodeId) -> String {
    session
        .with_document(|doc| describe(doc, node))
        .unwrap_or_else(|_| format!("element {node}"))
}

pub async fn options(page: PageArgs, locator: &str, json: bool) -> Result<()> {
    let (url, html) = load_page(page).await?;
    let session = SimSession::new();
    session.load(&url, &html);

    let parsed = Locator::parse(locator);
    let node = session
        .find(&parsed)
        .await?
        .with_context(|| format!("no element matches {locator}"))?;
    let listed = session.options(node).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }
    if listed.is_empty() {
        println!("(no options)");
        return Ok(());
    }
    for option in listed {
        let marker = if option.selected { "*" } else { " " };
        println!("{marker} {}\t{}", option.value, option.text);
    }
    Ok(())
}

pub async fn allow(action: AllowAction, file: Option<PathBuf>) -> Result<()> {
    let path = match file {
        Some(path) => path,
        None => AllowList::default_path()
            .context("cannot determine the allowlist path (no home directory)")?,
    };
    let mut list = AllowList::load(&path).await?;
    match action {
        AllowAction::Add { url } => {
            let stored = list.add(&url)?;
            list.save(&path).await?;
            println!("added {stored}");
        }
        AllowAction::Remove { url } => {
            if !list.remove(&url) {
                bail!("{url} is not on the allowlist");
            }
            list.save(&path).await?;
            println!("removed {url}");
        }
        AllowAction::List => {
            if list.entries.is_empty() {
                println!("(empty)");
            } else {
                for entry in &list.entries {
                    println!("{entry}");
                }
            }
        }
        AllowAction::Check { url } => {
            if list.permits(&url) {
                println!("{url} is allowed");
            } else {
                println!("{url} is not allowed");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
