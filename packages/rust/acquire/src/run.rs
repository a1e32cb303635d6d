//! End-to-end acquisition: from a book reference to a saved record.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use ranopress_shared::{
    Book, Chapter, FetchPolicy, ProgressReporter, RECORD_FILE_NAME, Result,
};

use crate::api::ApiClient;
use crate::content::{IMAGE_DIR, normalize_content};
use crate::resolve_book_id;

/// Acquire a whole book into `output_dir` and return the record path.
///
/// Metadata failure aborts the run; every later step degrades per item.
/// Chapters whose body cannot be fetched after retries are skipped with a
/// warning and do not appear in the record.
pub async fn acquire_book(
    reference: &str,
    output_dir: &Path,
    client: &ApiClient,
    policy: &FetchPolicy,
    progress: &dyn ProgressReporter,
) -> Result<PathBuf> {
    let book_id = resolve_book_id(reference)?;
    info!(book_id, "starting acquisition");

    progress.report(0.0, "preparing output directory");
    let image_dir = output_dir.join(IMAGE_DIR);
    std::fs::create_dir_all(&image_dir)
        .map_err(|e| ranopress_shared::RanopressError::io(&image_dir, e))?;

    progress.report(0.05, "fetching metadata");
    let info = client.fetch_metadata(&book_id).await?;
    let title = info
        .rus_name
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| info.name.clone().filter(|t| !t.is_empty()))
        .unwrap_or_else(|| "Без названия".to_string());

    progress.report(0.10, "fetching cover");
    let cover_image = fetch_cover(&book_id, output_dir, client, policy).await;

    progress.report(0.15, "fetching chapter list");
    let stubs = client.fetch_chapter_list(&book_id).await;
    let total = stubs.len();
    info!(total, "chapter list fetched");

    let mut chapters: Vec<Chapter> = Vec::with_capacity(total);
    for (index, stub) in stubs.into_iter().enumerate() {
        let fraction = 0.15 + ((index + 1) as f64 / total.max(1) as f64) * 0.8;
        progress.report(
            fraction,
            &format!("chapter {}/{}: {}", index + 1, total, stub.name),
        );

        let Some(data) = client
            .fetch_chapter_body(&book_id, &stub.volume, stub.number, policy)
            .await
        else {
            warn!(
                volume = %stub.volume,
                number = stub.number,
                name = %stub.name,
                "chapter unavailable, skipping"
            );
            continue;
        };

        let content =
            normalize_content(&data.content, &data.attachments, client, policy, output_dir).await;

        for attachment in &data.attachments {
            let dest = image_dir.join(&attachment.filename);
            if !client.fetch_image(&attachment.url, &dest, policy).await {
                warn!(filename = %attachment.filename, "attachment download failed");
            }
        }

        chapters.push(Chapter {
            id: data.id,
            volume: data.volume,
            number: data.number,
            name: data.name,
            attachments: data.attachments,
            content,
        });
    }

    progress.report(0.95, "saving record");
    let book = Book {
        id: book_id,
        title,
        original_title: info.name.unwrap_or_default(),
        description: info.summary.unwrap_or_default(),
        cover_image,
        chapters,
    };
    let record_path = output_dir.join(RECORD_FILE_NAME);
    book.save(&record_path)?;

    progress.report(1.0, "acquisition complete");
    info!(path = %record_path.display(), chapters = book.chapters.len(), "record saved");
    Ok(record_path)
}

/// Download the cover into the image folder, named `cover` plus the URL's
/// extension. Returns the record-relative path, or `None` if anything along
/// the way fails.
async fn fetch_cover(
    book_id: &str,
    output_dir: &Path,
    client: &ApiClient,
    policy: &FetchPolicy,
) -> Option<String> {
    let url = client.fetch_cover_url(book_id).await?;

    let ext = url
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| format!(".{ext}"))
        .unwrap_or_else(|| ".jpg".to_string());
    let filename = format!("cover{ext}");
    let dest = output_dir.join(IMAGE_DIR).join(&filename);

    if client.fetch_image(&url, &dest, policy).await {
        Some(format!("{IMAGE_DIR}/{filename}"))
    } else {
        warn!(url, "cover download failed");
        None
    }
}
