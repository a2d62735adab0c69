//! `pdfa ask`: run ingest and ask once from the terminal.
//!
//! Uses the same page settings, providers, and temp-file handling as the
//! HTTP upload and ask routes, without a login.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::keys::ApiKeys;
use crate::llm::create_chat_model;
use crate::pipeline;
use crate::upload::{check_pdf, TempUpload};

pub async fn run_ask(
    config: &Config,
    keys: &ApiKeys,
    file: &Path,
    page: Option<&str>,
    question: &str,
) -> Result<()> {
    let page = match page {
        Some(slug) => config
            .find_page(slug)
            .with_context(|| format!("no page named '{}' in config", slug))?,
        None => match config.apps.first() {
            Some(p) => p,
            None => bail!("no pages are configured"),
        },
    };
    let page_keys = keys.for_page(config, page)?;

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.pdf".to_string());
    check_pdf(&file_name, None)?;
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read PDF: {}", file.display()))?;
    if bytes.len() > config.upload.max_bytes {
        bail!(
            "{} is {} bytes, over the {} byte upload limit",
            file.display(),
            bytes.len(),
            config.upload.max_bytes
        );
    }

    let (embedding, embedding_key) = page_keys.embedding;
    let (llm, llm_key) = page_keys.llm;
    let embedder = create_embedder(&config.embedding, embedding, embedding_key)?;
    let chat = create_chat_model(&config.llm, llm, llm_key)?;

    let doc = {
        let upload = TempUpload::write(&config.upload.dir(), &file_name, &bytes)?;
        pipeline::ingest(config, &upload, embedder.as_ref()).await?
    };
    println!(
        "Indexed {} ({} pages, {} chunks)",
        doc.file_name,
        doc.pages,
        doc.index.len()
    );

    let answer = pipeline::ask(
        config,
        page,
        &doc,
        question,
        embedder.as_ref(),
        chat.as_ref(),
    )
    .await
    .context("Error processing question")?;

    println!();
    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for s in &answer.sources {
            println!("  [Source: {}]  score={:.4}", s.label, s.score);
        }
    }

    Ok(())
}
