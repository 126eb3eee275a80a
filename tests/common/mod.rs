#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use docchat::config::Config;
use docchat::embedding::Embedder;
use docchat::llm::CompletionModel;
use docchat::models::ChatMessage;
use docchat::progress::NoProgress;
use docchat::query::QueryEngine;
use docchat::session::Session;

pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );
    zip_with(&[("word/document.xml", xml.as_bytes())])
}

pub fn pptx(slides: &[&str]) -> Vec<u8> {
    let xmls: Vec<(String, String)> = slides
        .iter()
        .enumerate()
        .map(|(i, text)| {
            (
                format!("ppt/slides/slide{}.xml", i + 1),
                format!(
                    r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
                    text
                ),
            )
        })
        .collect();
    let entries: Vec<(&str, &[u8])> = xmls
        .iter()
        .map(|(n, x)| (n.as_str(), x.as_bytes()))
        .collect();
    zip_with(&entries)
}

/// EPUB whose spine lists the chapters in the given order.
pub fn epub(chapters: &[&str]) -> Vec<u8> {
    let container = r#"<?xml version="1.0"?><container xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#;
    let manifest: String = (0..chapters.len())
        .map(|i| {
            format!(
                r#"<item id="c{i}" href="c{i}.xhtml" media-type="application/xhtml+xml"/>"#
            )
        })
        .collect();
    let spine: String = (0..chapters.len())
        .map(|i| format!(r#"<itemref idref="c{i}"/>"#))
        .collect();
    let opf = format!(
        r#"<?xml version="1.0"?><package xmlns="http://www.idpf.org/2007/opf"><manifest>{}</manifest><spine>{}</spine></package>"#,
        manifest, spine
    );
    let pages: Vec<(String, String)> = chapters
        .iter()
        .enumerate()
        .map(|(i, text)| {
            (
                format!("OEBPS/c{}.xhtml", i),
                format!(
                    r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>t</title></head><body><p>{}</p></body></html>"#,
                    text
                ),
            )
        })
        .collect();

    let mut entries: Vec<(&str, &[u8])> = vec![
        ("mimetype", &b"application/epub+zip"[..]),
        ("META-INF/container.xml", container.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
    ];
    // reversed so archive order disagrees with the spine
    for (name, xml) in pages.iter().rev() {
        entries.push((name.as_str(), xml.as_bytes()));
    }
    zip_with(&entries)
}

/// One page per entry, each page drawing its text with a standard font.
pub fn pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Embeds text as letter frequencies of 'a'..'z'; counts batch calls.
#[derive(Clone, Default)]
pub struct FakeEmbedder {
    pub calls: Arc<AtomicUsize>,
}

impl FakeEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embedder"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.to_lowercase().chars() {
                    if c.is_ascii_lowercase() {
                        v[(c as u8 - b'a') as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Answers "answer to: <question>" or fails on demand; records prompts.
#[derive(Clone, Default)]
pub struct FakeLlm {
    pub fail: Arc<Mutex<bool>>,
    pub prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl FakeLlm {
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }
}

#[async_trait]
impl CompletionModel for FakeLlm {
    fn model_name(&self) -> &str {
        "fake-llm"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if *self.fail.lock().unwrap() {
            anyhow::bail!("401 invalid api key");
        }
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let question = prompt
            .split("Query: ")
            .nth(1)
            .and_then(|rest| rest.split('\n').next())
            .unwrap_or("");
        Ok(format!("answer to: {}", question))
    }
}

pub fn session_with(config: Config) -> (Session, FakeEmbedder, FakeLlm) {
    let embedder = FakeEmbedder::default();
    let llm = FakeLlm::default();
    let engine = QueryEngine::new(
        Box::new(embedder.clone()),
        Box::new(llm.clone()),
        config.retrieval.top_k,
    );
    (
        Session::new(config, engine, Box::new(NoProgress)),
        embedder,
        llm,
    )
}
