//! Command execution
//!
//! Each command returns the text to print so it can be tested without
//! capturing stdout. Library errors get context here and leave as `anyhow`.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use chat::{ChatRequest, ModelCatalog, OpenAiCompatClient, build_ocr_prompt};
use crop::{CropAction, CropSession, crop_to, load_oriented};
use key_pool::{CredentialPool, FileStore, send_with_failover};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::catalog_store::{load_catalog, save_catalog};
use crate::cli::{Command, ConversationCommand, DragSpec, KeysCommand, ModelsCommand, Viewport};
use crate::config::Config;
use crate::conversation::{COMBINED_SEPARATOR, Conversation, load_conversation, save_conversation};
use crate::metrics::{record_chat, record_command};
use crate::ocr::{CommandRecognizer, TextRecognizer, extract_text};

/// Everything a command needs, opened once per run.
pub struct App {
    pub config: Config,
    pub pool: Arc<CredentialPool>,
    pub models: FileStore,
    pub conversation: FileStore,
    pub client: OpenAiCompatClient,
    pub recognizer: Box<dyn TextRecognizer>,
}

impl App {
    /// Open the stores and build the HTTP client.
    ///
    /// When the pool is empty and OCR_CHAT_API_KEY is set, that key is added
    /// as the first entry.
    pub async fn open(config: Config) -> Result<Self> {
        let keys = FileStore::load(config.storage.keys_path.clone())
            .await
            .with_context(|| format!("opening key store {}", config.storage.keys_path.display()))?;
        let pool = CredentialPool::load(Arc::new(keys))
            .await
            .context("loading key pool")?;

        if let Some(key) = &config.api_key {
            if pool.is_empty().await {
                pool.add(key.expose().clone(), "API Key 1")
                    .await
                    .context("seeding key pool from OCR_CHAT_API_KEY")?;
                info!("seeded key pool from environment");
            }
        }

        let models = FileStore::load(config.storage.models_path.clone())
            .await
            .with_context(|| {
                format!("opening model store {}", config.storage.models_path.display())
            })?;

        let conversation = FileStore::load(config.storage.conversation_path.clone())
            .await
            .with_context(|| {
                format!(
                    "opening conversation store {}",
                    config.storage.conversation_path.display()
                )
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()
            .context("building HTTP client")?;
        let client = OpenAiCompatClient::new(http, config.api.base_url.clone());
        let recognizer = Box::new(CommandRecognizer::new(&config.ocr));

        Ok(Self {
            config,
            pool: Arc::new(pool),
            models,
            conversation,
            client,
            recognizer,
        })
    }
}

/// Run one command and return its output.
pub async fn run(app: &App, command: Command) -> Result<String> {
    match command {
        Command::Keys { action } => {
            record_command("keys");
            keys(app, action).await
        }
        Command::Models { action } => {
            record_command("models");
            models(app, action).await
        }
        Command::Ocr { image, ask: send } => {
            record_command("ocr");
            ocr(app, &image, send).await
        }
        Command::Conversation { action } => {
            record_command("conversation");
            conversation(app, action).await
        }
        Command::Crop {
            image,
            viewport,
            drags,
            out,
        } => {
            record_command("crop");
            crop_image(app, &image, viewport, &drags, &out)
        }
        Command::Ask {
            prompt,
            model,
            all_models,
            conversation,
        } => {
            record_command("ask");
            let prompt = read_prompt(prompt).await?;
            if all_models {
                ask_all(app, prompt, conversation).await
            } else {
                ask(app, prompt, model, conversation).await
            }
        }
    }
}

async fn keys(app: &App, action: KeysCommand) -> Result<String> {
    let pool = &app.pool;
    match action {
        KeysCommand::Add { key, label } => {
            let label = match label {
                Some(l) => l,
                None => format!("API Key {}", pool.len().await + 1),
            };
            if pool.add(key.trim(), label.clone()).await? {
                Ok(format!("added {label}"))
            } else {
                bail!(
                    "key not added: pool is full ({} keys) or the key is already present",
                    key_pool::MAX_KEYS
                )
            }
        }
        KeysCommand::List => {
            let all = pool.list_all().await;
            if all.is_empty() {
                return Ok("no keys configured".to_string());
            }
            let now = now_millis();
            let mut out = String::new();
            for (index, key) in all.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{index}  {:<16} {}  {:<8} used {:<4} last used {}",
                    key.label,
                    key.secret.hint(),
                    if key.active { "active" } else { "failed" },
                    key.usage_count,
                    format_last_used(now, key.last_used_at),
                );
            }
            Ok(out.trim_end().to_string())
        }
        KeysCommand::Status => Ok(serde_json::to_string_pretty(&pool.health().await)?),
        KeysCommand::Remove { index } => {
            if pool.remove(index).await? {
                Ok(format!("removed key {index}"))
            } else {
                bail!("no key at index {index}")
            }
        }
        KeysCommand::Update {
            index,
            label,
            active,
        } => {
            let Some(current) = pool.list_all().await.into_iter().nth(index) else {
                bail!("no key at index {index}");
            };
            let label = label.unwrap_or(current.label);
            let active = active.unwrap_or(current.active);
            if pool.update(index, label.clone(), active).await? {
                Ok(format!("updated key {index}: {label} ({})", if active { "active" } else { "inactive" }))
            } else {
                bail!("no key at index {index}")
            }
        }
        KeysCommand::Reset => {
            pool.reset_failed().await?;
            Ok(format!("{} active keys", pool.list_active().await.len()))
        }
        KeysCommand::Test => test_keys(app).await,
    }
}

/// Try each active key against the model list. Nothing is quarantined.
async fn test_keys(app: &App) -> Result<String> {
    let active = app.pool.list_active().await;
    let mut working = 0usize;
    let mut out = String::new();

    for key in &active {
        let outcome = match app.client.fetch_models(key.secret.expose()).await {
            Ok(models) if !models.is_empty() => {
                working += 1;
                format!("ok ({} models)", models.len())
            }
            Ok(_) => "failed: no models returned".to_string(),
            Err(e) => {
                warn!(label = %key.label, error = %e, "key test failed");
                format!("failed: {e}")
            }
        };
        let _ = writeln!(out, "{:<16} {}  {outcome}", key.label, key.secret.hint());
    }

    let _ = write!(out, "{working}/{} working", active.len());
    Ok(out)
}

/// `Just now`, `Nm ago`, `Nh ago` or `Nd ago`.
fn format_last_used(now_ms: u64, last_used_ms: u64) -> String {
    let diff = now_ms.saturating_sub(last_used_ms);
    match diff {
        d if d < 60_000 => "Just now".to_string(),
        d if d < 3_600_000 => format!("{}m ago", d / 60_000),
        d if d < 86_400_000 => format!("{}h ago", d / 3_600_000),
        d => format!("{}d ago", d / 86_400_000),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

async fn conversation(app: &App, action: ConversationCommand) -> Result<String> {
    match action {
        ConversationCommand::New => {
            save_conversation(&app.conversation, &Conversation::default()).await?;
            info!("conversation cleared");
            Ok("New conversation started".to_string())
        }
        ConversationCommand::Show => Ok(load_conversation(&app.conversation).await?.render()),
    }
}

async fn models(app: &App, action: ModelsCommand) -> Result<String> {
    let mut catalog = load_catalog(&app.models).await?;
    let changed = match action {
        ModelsCommand::List => false,
        ModelsCommand::Refresh => {
            refresh_catalog(app, &mut catalog).await?;
            true
        }
        ModelsCommand::Toggle { id } => {
            if !catalog.available().iter().any(|m| m.id == id) {
                warn!(model = %id, "toggling a model that is not in the known list");
            }
            catalog.toggle(&id);
            true
        }
        ModelsCommand::SelectAll => {
            catalog.select_all();
            true
        }
        ModelsCommand::DeselectAll => {
            catalog.deselect_all();
            true
        }
    };
    if changed {
        save_catalog(&app.models, &catalog).await?;
    }
    Ok(render_catalog(&catalog))
}

/// Fetch the model list with a pool key, or fall back to the defaults when
/// no key is available.
async fn refresh_catalog(app: &App, catalog: &mut ModelCatalog) -> Result<()> {
    match app.pool.next_credential().await? {
        Some(key) => {
            let (source, _) = catalog.refresh(&app.client, key.expose()).await;
            info!(?source, models = catalog.available().len(), "model list refreshed");
        }
        None => {
            warn!("no active key, using default models");
            catalog.use_defaults();
        }
    }
    Ok(())
}

fn render_catalog(catalog: &ModelCatalog) -> String {
    if catalog.available().is_empty() {
        return "no models known yet, run `ocr-chat models refresh`".to_string();
    }
    let mut out = String::new();
    for model in catalog.available() {
        let mark = if model.selected { "[x]" } else { "[ ]" };
        let _ = writeln!(out, "{mark} {:<28} {}", model.id, model.name);
    }
    out.trim_end().to_string()
}

async fn ocr(app: &App, image: &Path, send: bool) -> Result<String> {
    let text = extract_text(app.recognizer.as_ref(), image)
        .await
        .with_context(|| format!("recognizing text in {}", image.display()))?;
    let Some(prompt) = build_ocr_prompt(&text) else {
        bail!("no text recognized in {}", image.display());
    };
    if send {
        ask(app, prompt, None, false).await
    } else {
        Ok(prompt)
    }
}

fn crop_image(
    app: &App,
    image: &Path,
    viewport: Viewport,
    drags: &[DragSpec],
    out: &Path,
) -> Result<String> {
    let (bitmap, orientation) =
        load_oriented(image).with_context(|| format!("loading {}", image.display()))?;
    let (width, height) = (bitmap.width(), bitmap.height());
    info!(width, height, exif_orientation = orientation.to_exif(), "image loaded");

    let mut session = CropSession::new(app.config.crop);
    session.on_resize(viewport.width, viewport.height);
    session.attach_image(width, height);

    for drag in drags {
        match session.begin_drag(drag.handle) {
            CropAction::DragStarted(handle) if handle == drag.handle => {}
            other => bail!("could not grab {:?} handle: {other:?}", drag.handle),
        }
        session.on_pointer_move(drag.x, drag.y);
        session.on_pointer_up();
    }

    let pixels = session
        .finalize(width, height)
        .context("invalid crop area, pick the region again")?;
    let cropped = crop_to(&bitmap, pixels)?;
    cropped
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;

    Ok(serde_json::to_string(&serde_json::json!({
        "source": { "width": width, "height": height },
        "crop": pixels,
        "out": out.display().to_string(),
    }))?)
}

async fn read_prompt(prompt: String) -> Result<String> {
    let prompt = if prompt == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("reading prompt from stdin")?;
        buf
    } else {
        prompt
    };
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        bail!("prompt is empty");
    }
    Ok(prompt)
}

/// Model for single-model requests: `--model`, then `api.default_model`,
/// then the first selected model.
async fn pick_model(app: &App, explicit: Option<String>) -> Result<String> {
    if let Some(model) = explicit.or_else(|| app.config.api.default_model.clone()) {
        return Ok(model);
    }
    Ok(load_catalog(&app.models).await?.primary_model())
}

/// Stored conversation when `enabled`, otherwise an empty one.
async fn open_conversation(app: &App, enabled: bool) -> Result<Conversation> {
    if enabled {
        Ok(load_conversation(&app.conversation).await?)
    } else {
        Ok(Conversation::default())
    }
}

async fn ask(app: &App, prompt: String, model: Option<String>, with_history: bool) -> Result<String> {
    let model = pick_model(app, model).await?;
    let mut conversation = open_conversation(app, with_history).await?;

    let mut request = ChatRequest::new(model, prompt.clone());
    request.history = conversation.history();
    let reply = send_one(app.pool.as_ref(), &app.client, &request, app.config.api.max_attempts).await?;

    if with_history {
        conversation.push_exchange(&prompt, &reply, now_millis());
        save_conversation(&app.conversation, &conversation).await?;
    }
    Ok(reply)
}

async fn ask_all(app: &App, prompt: String, with_history: bool) -> Result<String> {
    let catalog = load_catalog(&app.models).await?;
    let selected = catalog.selected_models();
    if selected.is_empty() {
        bail!("no models selected, run `ocr-chat models select-all`");
    }
    let mut conversation = open_conversation(app, with_history).await?;
    let history = conversation.history();

    let mut tasks = Vec::with_capacity(selected.len());
    for model in &selected {
        let pool = app.pool.clone();
        let client = app.client.clone();
        let mut request = ChatRequest::new(model.id.clone(), prompt.clone());
        request.history = history.clone();
        let attempts = app.config.api.max_attempts;
        tasks.push(tokio::spawn(async move {
            send_one(pool.as_ref(), &client, &request, attempts).await
        }));
    }

    let mut out = String::new();
    let mut answers = Vec::with_capacity(selected.len());
    let mut any_ok = false;
    for (model, task) in selected.iter().zip(tasks) {
        let answer = match task.await {
            Ok(Ok(text)) => {
                any_ok = true;
                text
            }
            Ok(Err(e)) => format!("error: {e:#}"),
            Err(e) => format!("error: task failed: {e}"),
        };
        let _ = writeln!(out, "### {}\n{}\n", model.name, answer.trim());
        answers.push(answer.trim().to_string());
    }

    if with_history && any_ok {
        conversation.push_exchange(&prompt, &answers.join(COMBINED_SEPARATOR), now_millis());
        save_conversation(&app.conversation, &conversation).await?;
    }
    Ok(out.trim_end().to_string())
}

async fn send_one(
    pool: &CredentialPool,
    client: &OpenAiCompatClient,
    request: &ChatRequest,
    max_attempts: usize,
) -> Result<String> {
    let started = Instant::now();
    let result = send_with_failover(pool, client, request, max_attempts).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(text) => {
            record_chat(&request.model, "ok", elapsed);
            Ok(text)
        }
        Err(e) => {
            record_chat(&request.model, "error", elapsed);
            Err(e).with_context(|| format!("asking {}", request.model))
        }
    }
}
