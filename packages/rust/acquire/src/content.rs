//! Chapter content normalization.
//!
//! The API serves chapter bodies in two shapes: raw HTML markup, or a
//! structured node tree with a `type` discriminator. Both normalize to one
//! canonical HTML string whose `<img>` sources point at files under the
//! record's local `imgs/` directory. Anything else is an [`Unknown`] shape
//! and normalizes to an empty string — content loss is logged, never fatal.
//!
//! [`Unknown`]: ChapterContent::Unknown

use std::collections::HashMap;
use std::path::Path;

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use url::Url;

use ranopress_shared::{Attachment, FetchPolicy};

use crate::api::ApiClient;

/// Directory (relative to the record) holding downloaded raw images.
pub const IMAGE_DIR: &str = "imgs";

// ---------------------------------------------------------------------------
// Content model
// ---------------------------------------------------------------------------

/// The two supported content shapes plus an explicit catch-all.
///
/// Deserialization is untagged: a JSON string is markup, an object with a
/// `type` field is a node tree, anything else lands in `Unknown`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChapterContent {
    Markup(String),
    Doc(DocTree),
    Unknown(Value),
}

impl Default for ChapterContent {
    fn default() -> Self {
        Self::Unknown(Value::Null)
    }
}

/// Root of the structured shape: `{ "type": "doc", "content": [...] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct DocTree {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Vec<DocNode>,
}

/// A block-level node. Unsupported kinds are carried through and ignored
/// during rendering (forward-compatible no-op).
#[derive(Debug, Clone, Deserialize)]
pub struct DocNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Vec<InlineNode>,
    #[serde(default)]
    pub attrs: Option<NodeAttrs>,
}

/// An inline node inside a paragraph; only `text` leaves carry content.
#[derive(Debug, Clone, Deserialize)]
pub struct InlineNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeAttrs {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// One image reference inside an `image` node, matched against attachments
/// by identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub image: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize a chapter body to canonical HTML with local image paths.
///
/// Markup triggers nested image downloads into `<out_dir>/imgs/`; the
/// structured shape resolves image nodes against `attachments` (their files
/// are downloaded separately with the rest of the attachment list).
pub async fn normalize_content(
    content: &ChapterContent,
    attachments: &[Attachment],
    client: &ApiClient,
    policy: &FetchPolicy,
    out_dir: &Path,
) -> String {
    match content {
        ChapterContent::Markup(html) => localize_markup(html, client, policy, out_dir).await,
        ChapterContent::Doc(tree) if tree.kind == "doc" => doc_to_html(tree, attachments),
        ChapterContent::Doc(tree) => {
            warn!(kind = %tree.kind, "unsupported content tree, dropping");
            String::new()
        }
        ChapterContent::Unknown(_) => {
            warn!("unknown content shape, dropping");
            String::new()
        }
    }
}

/// Collected view of one `<img>` element: serialized tag plus attributes.
struct ImgTag {
    outer: String,
    attrs: Vec<(String, String)>,
    src: Option<String>,
}

/// Rewrite markup-shape HTML: download every remote or site-relative image
/// into the local image folder, point `src` at `imgs/<file>`, and strip any
/// `loading` attribute. Untouchable images keep their tag as-is.
async fn localize_markup(
    html: &str,
    client: &ApiClient,
    policy: &FetchPolicy,
    out_dir: &Path,
) -> String {
    // Collect first so the non-Send DOM is dropped before any await.
    let (mut result, tags) = {
        let doc = Html::parse_fragment(html);
        let img_sel = Selector::parse("img").expect("valid selector");
        let tags: Vec<ImgTag> = doc
            .select(&img_sel)
            .map(|el| ImgTag {
                outer: el.html(),
                attrs: el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                src: el.value().attr("src").map(String::from),
            })
            .collect();
        (doc.root_element().inner_html(), tags)
    };

    for tag in tags {
        let Some(src) = tag.src.as_deref() else {
            continue;
        };

        let mut new_src = None;
        if src.starts_with("http") || src.starts_with("/uploads/") {
            let filename = image_filename(src);
            let dest = out_dir.join(IMAGE_DIR).join(&filename);
            if client.fetch_image(src, &dest, policy).await {
                new_src = Some(format!("{IMAGE_DIR}/{filename}"));
            } else {
                warn!(src, "image download failed, keeping original source");
            }
        }

        let had_loading = tag.attrs.iter().any(|(k, _)| k == "loading");
        if new_src.is_none() && !had_loading {
            continue;
        }

        let rewritten = render_img_tag(&tag.attrs, new_src.as_deref());
        result = result.replacen(&tag.outer, &rewritten, 1);
    }

    result
}

/// Rebuild an `<img>` tag, dropping `loading` and optionally replacing `src`.
fn render_img_tag(attrs: &[(String, String)], new_src: Option<&str>) -> String {
    let mut tag = String::from("<img");
    for (name, value) in attrs {
        if name == "loading" {
            continue;
        }
        let value = match (name.as_str(), new_src) {
            ("src", Some(src)) => src,
            _ => value.as_str(),
        };
        tag.push_str(&format!(" {name}=\"{value}\""));
    }
    tag.push('>');
    tag
}

/// Derive a local filename from an image URL's last path segment.
fn image_filename(src: &str) -> String {
    let path = Url::parse(src)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| src.to_string());

    let name = path.rsplit('/').next().unwrap_or("").to_string();
    if name.is_empty() {
        "img_unknown.jpg".to_string()
    } else {
        name
    }
}

/// Render the structured shape to HTML.
///
/// `paragraph` nodes concatenate their `text` leaves into a `<p>`; `image`
/// nodes resolve each identifier to an attachment filename by exact match —
/// a miss produces zero tags and a warning. Every other node kind is a
/// no-op.
pub fn doc_to_html(tree: &DocTree, attachments: &[Attachment]) -> String {
    let by_identifier: HashMap<&str, &str> = attachments
        .iter()
        .map(|att| (att.identifier(), att.filename.as_str()))
        .collect();

    let mut parts: Vec<String> = Vec::new();

    for node in &tree.content {
        match node.kind.as_str() {
            "paragraph" => {
                let text: String = node
                    .content
                    .iter()
                    .filter(|inline| inline.kind == "text")
                    .map(|inline| inline.text.as_str())
                    .collect();
                if !text.trim().is_empty() {
                    parts.push(format!("<p>{}</p>", escape_html(&text)));
                }
            }
            "image" => {
                for image_ref in node.attrs.iter().flat_map(|attrs| &attrs.images) {
                    let Some(identifier) = image_ref.image.as_deref() else {
                        continue;
                    };
                    match by_identifier.get(identifier) {
                        Some(filename) => {
                            parts.push(format!("<img src=\"{IMAGE_DIR}/{filename}\"/>"));
                        }
                        None => {
                            warn!(identifier, "no attachment matches image node, skipping");
                        }
                    }
                }
            }
            _ => {}
        }
    }

    parts.join("\n")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranopress_shared::NetworkConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn att(id: Option<&str>, filename: &str) -> Attachment {
        Attachment {
            id: id.map(String::from),
            filename: filename.into(),
            url: format!("https://host/uploads/{filename}"),
        }
    }

    fn doc_from_json(json: serde_json::Value) -> ChapterContent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn content_deserializes_all_three_shapes() {
        assert!(matches!(
            doc_from_json(serde_json::json!("<p>hi</p>")),
            ChapterContent::Markup(_)
        ));
        assert!(matches!(
            doc_from_json(serde_json::json!({"type": "doc", "content": []})),
            ChapterContent::Doc(_)
        ));
        assert!(matches!(
            doc_from_json(serde_json::json!([1, 2, 3])),
            ChapterContent::Unknown(_)
        ));
    }

    #[test]
    fn doc_paragraphs_concatenate_text_leaves() {
        let ChapterContent::Doc(tree) = doc_from_json(serde_json::json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "One "},
                    {"type": "text", "text": "two."},
                ]},
                {"type": "paragraph", "content": [{"type": "text", "text": "   "}]},
            ]
        })) else {
            panic!("expected doc shape");
        };

        let html = doc_to_html(&tree, &[]);
        assert_eq!(html, "<p>One two.</p>");
    }

    #[test]
    fn doc_image_resolves_by_exact_identifier() {
        let ChapterContent::Doc(tree) = doc_from_json(serde_json::json!({
            "type": "doc",
            "content": [
                {"type": "image", "attrs": {"images": [
                    {"image": "8a57f2de-df06"},
                    {"image": "missing-id"},
                ]}},
            ]
        })) else {
            panic!("expected doc shape");
        };

        let attachments = vec![att(Some("8a57f2de-df06"), "8a57f2de.jpg")];
        let html = doc_to_html(&tree, &attachments);

        // Resolved identifier emits one tag; the unresolved one emits nothing.
        assert_eq!(html, "<img src=\"imgs/8a57f2de.jpg\"/>");
    }

    #[test]
    fn doc_image_falls_back_to_filename_stem() {
        let ChapterContent::Doc(tree) = doc_from_json(serde_json::json!({
            "type": "doc",
            "content": [
                {"type": "image", "attrs": {"images": [{"image": "17b9f599-efc3"}]}},
            ]
        })) else {
            panic!("expected doc shape");
        };

        let attachments = vec![att(None, "17b9f599-efc3.jpg")];
        assert_eq!(
            doc_to_html(&tree, &attachments),
            "<img src=\"imgs/17b9f599-efc3.jpg\"/>"
        );
    }

    #[test]
    fn doc_unsupported_nodes_are_ignored() {
        let ChapterContent::Doc(tree) = doc_from_json(serde_json::json!({
            "type": "doc",
            "content": [
                {"type": "heading", "content": [{"type": "text", "text": "Skip"}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "Keep"}]},
                {"type": "horizontalRule"},
            ]
        })) else {
            panic!("expected doc shape");
        };

        assert_eq!(doc_to_html(&tree, &[]), "<p>Keep</p>");
    }

    #[test]
    fn paragraph_text_is_escaped() {
        let ChapterContent::Doc(tree) = doc_from_json(serde_json::json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "a < b & c"}]},
            ]
        })) else {
            panic!("expected doc shape");
        };

        assert_eq!(doc_to_html(&tree, &[]), "<p>a &lt; b &amp; c</p>");
    }

    #[test]
    fn image_filename_from_url() {
        assert_eq!(image_filename("https://host/x/y.png"), "y.png");
        assert_eq!(image_filename("/uploads/a/b.jpg"), "b.jpg");
        assert_eq!(image_filename("https://host/"), "img_unknown.jpg");
    }

    #[tokio::test]
    async fn markup_rewrites_remote_img_and_strips_loading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x/y.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let network = NetworkConfig {
            api_base: server.uri(),
            site_base: server.uri(),
            ..NetworkConfig::default()
        };
        let client = ApiClient::new(&network).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let html = format!(
            "<p>before</p><img src=\"{}/x/y.png\" loading=\"lazy\"><p>after</p>",
            server.uri()
        );
        let result = normalize_content(
            &ChapterContent::Markup(html),
            &[],
            &client,
            &FetchPolicy::immediate(5),
            dir.path(),
        )
        .await;

        assert!(result.contains("src=\"imgs/y.png\""));
        assert!(!result.contains("loading"));
        assert!(result.contains("<p>before</p>"));
        assert!(dir.path().join("imgs/y.png").exists());
    }

    #[tokio::test]
    async fn markup_leaves_local_images_untouched() {
        let server = MockServer::start().await;
        let network = NetworkConfig {
            api_base: server.uri(),
            site_base: server.uri(),
            ..NetworkConfig::default()
        };
        let client = ApiClient::new(&network).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let html = "<img src=\"imgs/already.jpg\">".to_string();
        let result = normalize_content(
            &ChapterContent::Markup(html),
            &[],
            &client,
            &FetchPolicy::immediate(1),
            dir.path(),
        )
        .await;

        assert!(result.contains("src=\"imgs/already.jpg\""));
    }

    #[tokio::test]
    async fn unknown_shape_yields_empty_string() {
        let server = MockServer::start().await;
        let network = NetworkConfig {
            api_base: server.uri(),
            site_base: server.uri(),
            ..NetworkConfig::default()
        };
        let client = ApiClient::new(&network).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let result = normalize_content(
            &ChapterContent::Unknown(serde_json::json!(null)),
            &[],
            &client,
            &FetchPolicy::immediate(1),
            dir.path(),
        )
        .await;
        assert!(result.is_empty());
    }
}
