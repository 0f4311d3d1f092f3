//! Plain-text extraction for uploaded documents.

use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExtractError;

const PDFTOTEXT: &str = "pdftotext";
const DOCX_BODY: &str = "word/document.xml";

static RE_DOCX_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:p(?:\s[^>/]*)?>.*?</w:p>").unwrap());
static RE_DOCX_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:t(?:\s[^>/]*)?>(.*?)</w:t>").unwrap());

/// Upload formats accepted for ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Pdf,
    Docx,
    PlainText,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Pdf => "application/pdf",
            ContentType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ContentType::PlainText => "text/plain",
        }
    }

    /// Guess the content type from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(ContentType::Pdf),
            "docx" => Some(ContentType::Docx),
            other if crate::utils::is_text_extension(other) => Some(ContentType::PlainText),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}

impl std::str::FromStr for ContentType {
    type Err = ExtractError;

    /// Parse a MIME type; parameters such as `charset` are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let essence = s.split(';').next().unwrap_or("").trim().to_lowercase();
        [ContentType::Pdf, ContentType::Docx, ContentType::PlainText]
            .into_iter()
            .find(|ct| ct.mime() == essence)
            .ok_or_else(|| ExtractError::UnsupportedContentType(s.to_string()))
    }
}

/// Extract the plain text of an upload.
pub fn extract(bytes: &[u8], content_type: ContentType) -> Result<String, ExtractError> {
    match content_type {
        ContentType::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ContentType::Docx => extract_docx(bytes),
        ContentType::Pdf => extract_pdf(bytes),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive.by_name(DOCX_BODY)?.read_to_string(&mut xml)?;
    Ok(docx_xml_to_text(&xml))
}

/// One line per `<w:p>` paragraph, built from its `<w:t>` runs.
fn docx_xml_to_text(xml: &str) -> String {
    RE_DOCX_PARAGRAPH
        .find_iter(xml)
        .map(|paragraph| {
            RE_DOCX_TEXT
                .captures_iter(paragraph.as_str())
                .filter_map(|c| c.get(1))
                .map(|m| decode_xml_entities(m.as_str()))
                .collect::<String>()
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Whether the PDF extraction tool can be launched.
pub fn pdftotext_available() -> bool {
    Command::new(PDFTOTEXT)
        .arg("-v")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut child = Command::new(PDFTOTEXT)
        .args(["-layout", "-enc", "UTF-8", "-", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExtractError::ToolNotFound(PDFTOTEXT.to_string()),
            _ => ExtractError::IoError(e),
        })?;

    // Feed stdin from a separate thread so a full stdout pipe can't stall us.
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ExtractError::Failed("pdftotext stdin unavailable".to_string()))?;
    let input = bytes.to_vec();
    let writer = std::thread::spawn(move || stdin.write_all(&input));

    let output = child.wait_with_output()?;
    let written = writer
        .join()
        .map_err(|_| ExtractError::Failed("pdftotext writer panicked".to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Failed(format!(
            "pdftotext failed: {}",
            stderr.trim()
        )));
    }
    written?;

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
