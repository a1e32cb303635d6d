//! Book layout: cover, title page, per-volume sections, two-level TOC.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use scraper::{Html, Selector};
use tracing::{info, warn};

use ranopress_shared::{Book, Chapter, Result, VolumeKey};

use crate::images::ImageStore;
use crate::writer::{EpubDocument, Page, Resource, TocEntry, escape_xml};

/// Stylesheet attached to every page.
const STYLE_CSS: &str = r#"@namespace epub "http://www.idpf.org/2007/ops";
body {
    font-family: Arial, sans-serif;
    line-height: 1.6;
    margin: 0 auto;
    max-width: 800px;
}
h1, h2, h3 {
    text-align: center;
    margin: 1em 0;
}
p {
    margin: 0.5em 0;
    text-indent: 1.5em;
}
img {
    display: block;
    margin: 1em auto;
    max-width: 100%;
}
"#;

/// Assembles one EPUB from a record file and its sibling image directory.
pub struct EpubBuilder {
    book: Book,
    base_dir: PathBuf,
    images: ImageStore,
}

impl EpubBuilder {
    /// Load the record at `record_path`. Missing or invalid records error;
    /// nothing else is touched until [`assemble`](Self::assemble).
    pub fn load(record_path: &Path, image_quality: u8) -> Result<Self> {
        let book = Book::load(record_path)?;
        let base_dir = record_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        Ok(Self {
            book,
            base_dir,
            images: ImageStore::new(image_quality),
        })
    }

    /// Build the document and write `<title>.epub` beside the record.
    pub fn assemble(self) -> Result<PathBuf> {
        let Self {
            book,
            base_dir,
            mut images,
        } = self;

        let mut doc = EpubDocument {
            identifier: format!("ranopress-{}", book.id),
            title: book.title.clone(),
            language: "ru".to_string(),
            description: book.description.clone(),
            cover_href: None,
            pages: Vec::new(),
            resources: vec![Resource {
                href: "style/main.css".into(),
                media_type: "text/css".into(),
                data: STYLE_CSS.as_bytes().to_vec(),
            }],
            toc: Vec::new(),
        };

        build_cover(&book, &base_dir, &mut images, &mut doc);

        let volumes = group_volumes(&book.chapters);
        doc.pages.push(title_page(&book, &volumes));
        doc.toc.push(TocEntry {
            title: "Титульная страница".into(),
            href: "title_page.xhtml".into(),
            children: vec![],
        });

        let mut attached: HashSet<String> = HashSet::new();
        for (label, chapters) in &volumes {
            let (page, entry) =
                volume_section(label, chapters, &base_dir, &mut images, &mut doc, &mut attached);
            doc.pages.push(page);
            doc.toc.push(entry);
        }

        let out_path = base_dir.join(format!("{}.epub", book.title.replace('/', "_")));
        doc.write(&out_path)?;

        let (hits, misses) = images.stats();
        info!(
            path = %out_path.display(),
            volumes = volumes.len(),
            image_cache_hits = hits,
            image_cache_misses = misses,
            "epub written"
        );
        Ok(out_path)
    }
}

/// Chapters grouped by volume label, volumes and chapters both in reading
/// order.
fn group_volumes(chapters: &[Chapter]) -> Vec<(String, Vec<&Chapter>)> {
    let mut volumes: Vec<(String, Vec<&Chapter>)> = Vec::new();
    for chapter in chapters {
        match volumes.iter_mut().find(|(label, _)| *label == chapter.volume) {
            Some((_, list)) => list.push(chapter),
            None => volumes.push((chapter.volume.clone(), vec![chapter])),
        }
    }
    volumes.sort_by(|a, b| VolumeKey::parse(&a.0).cmp(&VolumeKey::parse(&b.0)));
    for (_, list) in &mut volumes {
        list.sort_by(|a, b| a.number.total_cmp(&b.number));
    }
    volumes
}

/// Cover page plus compressed cover resource. Any failure leaves the book
/// coverless with a warning.
fn build_cover(book: &Book, base_dir: &Path, images: &mut ImageStore, doc: &mut EpubDocument) {
    let Some(relative) = &book.cover_image else {
        return;
    };
    let path = base_dir.join(relative);
    if !path.exists() {
        warn!(path = %path.display(), "cover file missing, skipping cover");
        return;
    }

    match images.compress(&path) {
        Ok(data) => {
            doc.resources.push(Resource {
                href: "images/cover.jpg".into(),
                media_type: "image/jpeg".into(),
                data,
            });
            doc.cover_href = Some("images/cover.jpg".into());
            doc.pages.push(Page {
                title: "Cover".into(),
                href: "cover.xhtml".into(),
                body: "<div style=\"text-align:center;\">\
                       <img src=\"images/cover.jpg\" alt=\"cover\"/></div>"
                    .into(),
            });
        }
        Err(e) => warn!(path = %path.display(), error = %e, "cover processing failed"),
    }
}

/// Title page: title, original title, description, and a forward link to
/// the first volume (dead `#` link when there are no volumes).
fn title_page(book: &Book, volumes: &[(String, Vec<&Chapter>)]) -> Page {
    let link = volumes
        .first()
        .map(|(label, _)| format!("volume_{label}.xhtml#volume_{label}"))
        .unwrap_or_else(|| "#".to_string());

    let body = format!(
        r#"<h1 style="text-align:center;">{title}</h1>
<h2 style="text-align:center;">{original}</h2>
<h3>Описание</h3>
<p>{description}</p>
<p style="text-align:center;">
  <a href="{link}" style="font-size:1.2em;">Далее &#187;</a>
</p>
<h3>Содержание</h3>
<p>Используйте оглавление или кнопку &#171;Далее&#187;.</p>"#,
        title = escape_xml(&book.title),
        original = escape_xml(&book.original_title),
        description = escape_xml(&book.description),
    );

    Page {
        title: "Титульная страница".into(),
        href: "title_page.xhtml".into(),
        body,
    }
}

/// One volume's page and TOC subtree: a volume heading, then per chapter an
/// anchored heading and its body with image sources repointed at compressed
/// in-book resources.
fn volume_section(
    label: &str,
    chapters: &[&Chapter],
    base_dir: &Path,
    images: &mut ImageStore,
    doc: &mut EpubDocument,
    attached: &mut HashSet<String>,
) -> (Page, TocEntry) {
    let volume_title = format!("Том {label}");
    let href = format!("volume_{label}.xhtml");

    let mut parts = vec![format!("<h2 id=\"volume_{label}\">{}</h2>", escape_xml(&volume_title))];
    let mut children = Vec::new();

    for chapter in chapters {
        let chapter_title = format!(
            "Глава {} - {}",
            display_number(chapter.number),
            chapter.name
        );
        let anchor = format!("chapter_{}", chapter.id);

        parts.push(format!(
            "<h3 id=\"{anchor}\">{}</h3>",
            escape_xml(&chapter_title)
        ));
        parts.push(attach_images(&chapter.content, base_dir, images, doc, attached));

        children.push(TocEntry {
            title: chapter_title,
            href: format!("{href}#{anchor}"),
            children: vec![],
        });
    }

    (
        Page {
            title: volume_title.clone(),
            href: href.clone(),
            body: parts.join("\n"),
        },
        TocEntry {
            title: volume_title,
            href,
            children,
        },
    )
}

/// Rewrite every `src="imgs/<file>"` in chapter HTML to `images/<file>`,
/// registering the compressed file as a resource the first time it appears.
/// Missing files keep their original tag with a warning.
fn attach_images(
    html: &str,
    base_dir: &Path,
    images: &mut ImageStore,
    doc: &mut EpubDocument,
    attached: &mut HashSet<String>,
) -> String {
    let doc_html = Html::parse_fragment(html);
    let img_sel = Selector::parse("img").expect("valid selector");

    let tags: Vec<(String, Vec<(String, String)>, String)> = doc_html
        .select(&img_sel)
        .filter_map(|el| {
            let src = el.value().attr("src")?;
            src.starts_with("imgs/").then(|| {
                (
                    el.html(),
                    el.value()
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    src.to_string(),
                )
            })
        })
        .collect();

    let mut result = doc_html.root_element().inner_html();
    for (outer, attrs, src) in tags {
        let file = base_dir.join(&src);
        if !file.exists() {
            warn!(path = %file.display(), "chapter image missing, leaving reference");
            continue;
        }
        let basename = src.rsplit('/').next().unwrap_or(&src);
        let new_href = format!("images/{basename}");

        if attached.insert(new_href.clone()) {
            match images.compress(&file) {
                Ok(data) => doc.resources.push(Resource {
                    href: new_href.clone(),
                    media_type: "image/jpeg".into(),
                    data,
                }),
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "chapter image unreadable, leaving reference");
                    attached.remove(&new_href);
                    continue;
                }
            }
        }

        let mut tag = String::from("<img");
        for (name, value) in &attrs {
            let value = if name == "src" { &new_href } else { value };
            tag.push_str(&format!(" {name}=\"{value}\""));
        }
        tag.push_str("/>");
        result = result.replacen(&outer, &tag, 1);
    }

    result
}

/// Whole chapter numbers render without a trailing `.0`.
fn display_number(number: f64) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}
