//! Builders for test documents and scripted extraction clients.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use invex::{Extraction, ExtractionClient, ExtractionError, ExtractionUsage, InputFile};

/// Builds a PDF whose pages carry a `Marker` entry equal to their page number.
pub fn pdf_with_pages(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (1..=pages)
        .map(|n| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Marker" => n as i64,
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize test PDF");
    bytes
}

/// Reads back the `Marker` of every page, in page order.
pub fn pdf_markers(bytes: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(bytes).expect("Failed to parse PDF");
    doc.get_pages()
        .values()
        .map(|id| {
            doc.get_dictionary(*id)
                .and_then(|page| page.get(b"Marker"))
                .and_then(|marker| marker.as_i64())
                .expect("Page without marker")
        })
        .collect()
}

/// Encodes a solid-colour PNG.
pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    bytes
}

pub fn pdf_file(name: &str, pages: u32) -> InputFile {
    InputFile::new(name, pdf_with_pages(pages))
}

pub fn png_file(name: &str) -> InputFile {
    InputFile::new(name, png_image(640, 480))
}

/// How the scripted client answers for a file.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(String),
    /// Succeeds after the delay unless cancelled first.
    Slow(Duration),
    /// Never answers on its own; returns `Cancelled` once the token fires.
    Hang,
}

/// Extraction client whose answers are chosen by file name.
pub struct ScriptedClient {
    default: Behavior,
    rules: Vec<(String, Behavior)>,
    cost: f64,
    calls: AtomicUsize,
    started: Notify,
}

impl ScriptedClient {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            rules: Vec::new(),
            cost: 0.01,
            calls: AtomicUsize::new(0),
            started: Notify::new(),
        }
    }

    /// Uses `behavior` for files whose name contains `pattern`.
    pub fn when(mut self, pattern: &str, behavior: Behavior) -> Self {
        self.rules.push((pattern.to_string(), behavior));
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resolves once any call has started since the last wait.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    fn behavior_for(&self, name: &str) -> &Behavior {
        self.rules
            .iter()
            .find(|(pattern, _)| name.contains(pattern.as_str()))
            .map(|(_, behavior)| behavior)
            .unwrap_or(&self.default)
    }

    fn success(&self, file: &InputFile) -> Extraction {
        Extraction {
            data: serde_json::json!({
                "text": format!(
                    "```json\n{{\"file\": \"{}\", \"total\": 42.5}}\n```",
                    file.name
                )
            }),
            usage: ExtractionUsage {
                input_tokens: 100,
                output_tokens: 20,
                total_tokens: 120,
                duration_ms: 5,
                estimated_cost: self.cost,
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl ExtractionClient for ScriptedClient {
    async fn extract(
        &self,
        file: &InputFile,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        match self.behavior_for(&file.name).clone() {
            Behavior::Succeed => Ok(self.success(file)),
            Behavior::Fail(message) => Err(ExtractionError::Other(message)),
            Behavior::Slow(delay) => tokio::select! {
                _ = cancel.cancelled() => Err(ExtractionError::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(self.success(file)),
            },
            Behavior::Hang => {
                cancel.cancelled().await;
                Err(ExtractionError::Cancelled)
            }
        }
    }
}
