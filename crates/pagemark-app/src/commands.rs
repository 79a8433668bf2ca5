//! Subcommand implementations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use pagemark_core::source::FileFetcher;
use pagemark_core::storage::{Attachment, FileStorage, upload_batch};
use pagemark_core::{
    AnnotateError, BlankPageRasterizer, DISPLAY_SCALE, DocumentExporter, DocumentRef, DocumentSource,
    EngineConfig, NotificationLevel, OverlayStore, PageRasterizer, PageSession, SessionOptions, Snapshot,
    Storage, ToolMode,
};

use crate::cli::{
    AnnotateArgs, Cli, Commands, DocumentArgs, ExportArgs, PageArgs, PreviewArgs, RecordArgs, UploadArgs,
};

/// Shared state for one invocation.
struct Invocation {
    config: EngineConfig,
    storage_dir: Option<PathBuf>,
    source: DocumentSource,
}

impl Invocation {
    fn new(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        let source = DocumentSource::new(Arc::new(FileFetcher::new())).with_config(&config);
        Ok(Self {
            config,
            storage_dir: cli.storage.clone(),
            source,
        })
    }

    fn storage(&self) -> Result<Arc<FileStorage>> {
        let storage = match &self.storage_dir {
            Some(dir) => FileStorage::new(dir.clone())?,
            None => FileStorage::default_location()?,
        };
        log::debug!("Using storage at {}", storage.base_path().display());
        Ok(Arc::new(storage))
    }

    async fn session(&self, doc: &DocumentRef, store: OverlayStore) -> Result<PageSession<BlankPageRasterizer>> {
        let options = SessionOptions::default()
            .with_store(store)
            .with_tool(self.config.default_tool);
        PageSession::load(&self.source, doc, Arc::new(BlankPageRasterizer::new()), options)
            .await
            .map_err(notify)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let ctx = Invocation::new(&cli)?;
    match cli.command {
        Commands::Inspect(args) => inspect(&ctx, args).await,
        Commands::Annotate(args) => annotate(&ctx, args).await,
        Commands::Clear(args) => clear(&ctx, args).await,
        Commands::Preview(args) => preview(&ctx, args).await,
        Commands::Export(args) => export(&ctx, args).await,
        Commands::Artifacts(args) => artifacts(&ctx, args).await,
        Commands::Upload(args) => upload(&ctx, args).await,
    }
}

/// Log the operator-facing notification for `err` and hand it on.
fn notify(err: AnnotateError) -> anyhow::Error {
    if let Some(notification) = err.notification() {
        match notification.level {
            NotificationLevel::Info => log::info!("{}: {}", notification.title, notification.message),
            NotificationLevel::Warning => log::warn!("{}: {}", notification.title, notification.message),
            NotificationLevel::Error => log::error!("{}: {}", notification.title, notification.message),
        }
    }
    anyhow::Error::new(err)
}

fn document_ref(args: &DocumentArgs) -> DocumentRef {
    let filename = Path::new(&args.document)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document.pdf");
    DocumentRef::new(args.document.clone(), filename)
}

fn load_store(path: &Path) -> Result<OverlayStore> {
    if !path.exists() {
        return Ok(OverlayStore::new());
    }
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    OverlayStore::from_json(&json).with_context(|| format!("parsing {}", path.display()))
}

fn save_store(path: &Path, store: &OverlayStore) -> Result<()> {
    fs::write(path, store.to_json()?).with_context(|| format!("writing {}", path.display()))?;
    log::info!("Saved {} annotated pages to {}", store.len(), path.display());
    Ok(())
}

/// Read `page-<n>.png` files from `dir` into a store.
fn load_overlay_dir(dir: &Path) -> Result<OverlayStore> {
    let mut store = OverlayStore::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let Some(page) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix("page-"))
            .and_then(|rest| rest.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
        else {
            log::debug!("Ignoring {}", path.display());
            continue;
        };
        let snapshot = Snapshot::from_png(fs::read(&path)?).with_context(|| format!("decoding {}", path.display()))?;
        store.insert(page, snapshot);
    }
    Ok(store)
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

async fn inspect(ctx: &Invocation, args: DocumentArgs) -> Result<()> {
    let bytes = ctx
        .source
        .fetch(&document_ref(&args))
        .await
        .map_err(|e| notify(e.into()))?;
    let rasterizer = BlankPageRasterizer::new();
    let pages = rasterizer.page_count(&bytes)?;
    println!("{}: {} pages", args.document, pages);
    for page in 1..=pages {
        let size = rasterizer.render(&bytes, page, DISPLAY_SCALE).await?.size();
        println!("  page {}: {}x{} px", page, size.width, size.height);
    }
    Ok(())
}

async fn annotate(ctx: &Invocation, args: AnnotateArgs) -> Result<()> {
    let target = args.target;
    let doc = document_ref(&target.document);
    let mut session = ctx.session(&doc, load_store(&target.store)?).await?;
    session.show_page(target.page).await.map_err(notify)?;

    session.set_mode(if args.erase { ToolMode::Erase } else { ToolMode::Mark });
    if let Some(color) = args.color {
        session.set_color(color);
    }
    if let Some(width) = args.width {
        session.set_stroke_width(width);
    }

    let (first, rest) = args
        .points
        .split_first()
        .ok_or_else(|| anyhow!("a stroke needs at least two points"))?;
    session.pointer_down(*first);
    for point in rest {
        session.pointer_move(*point);
    }
    session.pointer_up().map_err(notify)?;
    println!(
        "Page {}: {} marked pixels",
        session.page_indicator(),
        session.overlay().painted_pixels()
    );

    save_store(&target.store, &session.close().map_err(notify)?)
}

async fn clear(ctx: &Invocation, args: PageArgs) -> Result<()> {
    let doc = document_ref(&args.document);
    let mut session = ctx.session(&doc, load_store(&args.store)?).await?;
    session.show_page(args.page).await.map_err(notify)?;
    session.clear_current_page();
    save_store(&args.store, &session.close().map_err(notify)?)
}

async fn preview(ctx: &Invocation, args: PreviewArgs) -> Result<()> {
    let target = args.target;
    let doc = document_ref(&target.document);
    let mut session = ctx.session(&doc, load_store(&target.store)?).await?;
    session.show_page(target.page).await.map_err(notify)?;

    let mut page = session.base().clone();
    image::imageops::overlay(&mut page, session.overlay().image(), 0, 0);
    page.save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("writing {}", args.out.display()))?;
    println!("Wrote page {} to {}", session.page_indicator(), args.out.display());
    Ok(())
}

async fn export(ctx: &Invocation, args: ExportArgs) -> Result<()> {
    let store = match (&args.store, &args.overlays) {
        (Some(path), _) => load_store(path)?,
        (None, Some(dir)) => load_overlay_dir(dir)?,
        (None, None) => bail!("either --store or --overlays is required"),
    };
    let doc = document_ref(&args.document);
    let pages = store.pages();
    let mut session = ctx.session(&doc, store).await?;

    // Visiting each page checks that its overlay matches the page size.
    // Entries past the last page are left for the exporter to skip.
    let page_count = session.page_count();
    for page in pages.into_iter().filter(|&p| p <= page_count) {
        session.show_page(page).await.map_err(notify)?;
    }

    let exporter = DocumentExporter::new(ctx.source.clone(), ctx.storage()?, ctx.config.clone());
    let artifact = session.export(&exporter, &doc, &args.record).await.map_err(notify)?;
    println!("{}", artifact.path);
    Ok(())
}

async fn artifacts(ctx: &Invocation, args: RecordArgs) -> Result<()> {
    let storage = ctx.storage()?;
    let refs = storage.artifact_refs(&args.record).await?;
    if refs.is_empty() {
        println!("No artifacts for {}", args.record);
    }
    for artifact in refs {
        println!("{}  {}  {}", artifact.created_at.to_rfc3339(), artifact.filename, artifact.path);
    }
    Ok(())
}

async fn upload(ctx: &Invocation, args: UploadArgs) -> Result<()> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?
            .to_string();
        files.push(Attachment {
            filename,
            content_type: content_type_for(path).to_string(),
            bytes: fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        });
    }

    let storage = ctx.storage()?;
    let report = upload_batch(storage.as_ref(), &args.record, files, &ctx.config, Utc::now()).await?;
    for uploaded in &report.uploaded {
        println!("uploaded  {}", uploaded.path);
    }
    for skipped in &report.skipped {
        println!(
            "skipped   {} ({} bytes, limit {})",
            skipped.filename, skipped.size, skipped.limit
        );
    }
    Ok(())
}
