//! EPUB 2 container serialization.
//!
//! Writes the zip layout readers expect: a stored (uncompressed) `mimetype`
//! as the first entry, then `META-INF/container.xml`, the OPF package
//! document, the NCX table of contents, and every page and resource
//! deflated under `OEBPS/`.

use std::io::Write;
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use ranopress_shared::{RanopressError, Result};

/// A reading-order XHTML page. `body` is a fragment; the writer wraps it in
/// the XHTML skeleton with the shared stylesheet attached.
pub struct Page {
    pub title: String,
    pub href: String,
    pub body: String,
}

/// A non-page asset (image, stylesheet) stored under `OEBPS/`.
pub struct Resource {
    pub href: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// One table-of-contents node; children nest one level per depth.
pub struct TocEntry {
    pub title: String,
    pub href: String,
    pub children: Vec<TocEntry>,
}

/// Everything needed to serialize one EPUB.
pub struct EpubDocument {
    pub identifier: String,
    pub title: String,
    pub language: String,
    pub description: String,
    /// Manifest href of the cover image, when the book has one.
    pub cover_href: Option<String>,
    /// Pages in spine (reading) order.
    pub pages: Vec<Page>,
    pub resources: Vec<Resource>,
    pub toc: Vec<TocEntry>,
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

impl EpubDocument {
    /// Serialize the document to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| RanopressError::io(path, e))?;
        let mut zip = ZipWriter::new(file);

        let stored =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let deflated =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let zip_err = |e: zip::result::ZipError| RanopressError::Epub(e.to_string());
        let io_err = |e: std::io::Error| RanopressError::io(path, e);

        // Readers sniff the mimetype at a fixed offset, so it goes first
        // and uncompressed.
        zip.start_file("mimetype", stored).map_err(zip_err)?;
        zip.write_all(b"application/epub+zip").map_err(io_err)?;

        zip.start_file("META-INF/container.xml", deflated)
            .map_err(zip_err)?;
        zip.write_all(CONTAINER_XML.as_bytes()).map_err(io_err)?;

        zip.start_file("OEBPS/content.opf", deflated)
            .map_err(zip_err)?;
        zip.write_all(self.render_opf().as_bytes()).map_err(io_err)?;

        zip.start_file("OEBPS/toc.ncx", deflated).map_err(zip_err)?;
        zip.write_all(self.render_ncx().as_bytes()).map_err(io_err)?;

        for page in &self.pages {
            zip.start_file(format!("OEBPS/{}", page.href), deflated)
                .map_err(zip_err)?;
            zip.write_all(render_xhtml(&page.title, &page.body).as_bytes())
                .map_err(io_err)?;
        }

        for resource in &self.resources {
            zip.start_file(format!("OEBPS/{}", resource.href), deflated)
                .map_err(zip_err)?;
            zip.write_all(&resource.data).map_err(io_err)?;
        }

        zip.finish().map_err(zip_err)?;
        Ok(())
    }

    fn render_opf(&self) -> String {
        let mut opf = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
"#,
        );

        opf.push_str(&format!(
            "    <dc:title>{}</dc:title>\n",
            escape_xml(&self.title)
        ));
        opf.push_str(&format!(
            "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
            escape_xml(&self.identifier)
        ));
        opf.push_str(&format!("    <dc:language>{}</dc:language>\n", self.language));
        if !self.description.is_empty() {
            opf.push_str(&format!(
                "    <dc:description>{}</dc:description>\n",
                escape_xml(&self.description)
            ));
        }
        if self.cover_href.is_some() {
            opf.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
        }

        opf.push_str("  </metadata>\n  <manifest>\n");
        opf.push_str(
            "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
        );

        for page in &self.pages {
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                href_to_id(&page.href),
                escape_xml(&page.href)
            ));
        }
        for resource in &self.resources {
            let id = if self.cover_href.as_deref() == Some(resource.href.as_str()) {
                "cover-image".to_string()
            } else {
                href_to_id(&resource.href)
            };
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
                id,
                escape_xml(&resource.href),
                escape_xml(&resource.media_type)
            ));
        }

        opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");
        for page in &self.pages {
            opf.push_str(&format!(
                "    <itemref idref=\"{}\"/>\n",
                href_to_id(&page.href)
            ));
        }
        opf.push_str("  </spine>\n</package>\n");
        opf
    }

    fn render_ncx(&self) -> String {
        let mut ncx = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content=""#,
        );
        ncx.push_str(&escape_xml(&self.identifier));
        ncx.push_str(
            r#""/>
    <meta name="dtb:depth" content="2"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>"#,
        );
        ncx.push_str(&escape_xml(&self.title));
        ncx.push_str(
            r#"</text>
  </docTitle>
  <navMap>
"#,
        );

        let mut play_order = 1;
        for entry in &self.toc {
            write_nav_point(&mut ncx, entry, &mut play_order, 2);
        }

        ncx.push_str("  </navMap>\n</ncx>\n");
        ncx
    }
}

fn write_nav_point(ncx: &mut String, entry: &TocEntry, play_order: &mut usize, indent: usize) {
    let pad = "  ".repeat(indent);

    ncx.push_str(&format!(
        "{pad}<navPoint id=\"navpoint-{0}\" playOrder=\"{0}\">\n",
        play_order
    ));
    ncx.push_str(&format!(
        "{pad}  <navLabel>\n{pad}    <text>{}</text>\n{pad}  </navLabel>\n",
        escape_xml(&entry.title)
    ));
    ncx.push_str(&format!(
        "{pad}  <content src=\"{}\"/>\n",
        escape_xml(&entry.href)
    ));

    *play_order += 1;
    for child in &entry.children {
        write_nav_point(ncx, child, play_order, indent + 1);
    }

    ncx.push_str(&format!("{pad}</navPoint>\n"));
}

fn render_xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <title>{}</title>
  <link rel="stylesheet" type="text/css" href="style/main.css"/>
</head>
<body>
{body}
</body>
</html>
"#,
        escape_xml(title)
    )
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn href_to_id(href: &str) -> String {
    href.replace(['/', '.', ' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_doc() -> EpubDocument {
        EpubDocument {
            identifier: "ranopress-1--t".into(),
            title: "T & Co".into(),
            language: "ru".into(),
            description: String::new(),
            cover_href: None,
            pages: vec![Page {
                title: "First".into(),
                href: "title_page.xhtml".into(),
                body: "<p>hi</p>".into(),
            }],
            resources: vec![],
            toc: vec![TocEntry {
                title: "First".into(),
                href: "title_page.xhtml".into(),
                children: vec![],
            }],
        }
    }

    #[test]
    fn opf_escapes_metadata_and_lists_spine() {
        let opf = minimal_doc().render_opf();
        assert!(opf.contains("<dc:title>T &amp; Co</dc:title>"));
        assert!(opf.contains("<itemref idref=\"title_page_xhtml\"/>"));
        assert!(!opf.contains("cover-image"));
    }

    #[test]
    fn ncx_play_order_covers_nested_entries() {
        let mut doc = minimal_doc();
        doc.toc = vec![TocEntry {
            title: "Том 1".into(),
            href: "volume_1.xhtml".into(),
            children: vec![
                TocEntry {
                    title: "Глава 1".into(),
                    href: "volume_1.xhtml#chapter_1".into(),
                    children: vec![],
                },
                TocEntry {
                    title: "Глава 2".into(),
                    href: "volume_1.xhtml#chapter_2".into(),
                    children: vec![],
                },
            ],
        }];

        let ncx = doc.render_ncx();
        for n in 1..=3 {
            assert!(ncx.contains(&format!("playOrder=\"{n}\"")));
        }
        assert!(ncx.contains("volume_1.xhtml#chapter_2"));
    }

    #[test]
    fn mimetype_is_first_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.epub");
        minimal_doc().write(&path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
    }
}
