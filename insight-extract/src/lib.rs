use anyhow::{Context, Result};
use async_trait::async_trait;
use insight_core::{
    Extraction, ExtractionError, HeadingLevel, OutlineEntry, OutlineExtractor, PageRef,
    PreviewConfig, SourceDocument,
};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

const PDF_MIME: &str = "application/pdf";

/// Posts documents to the outline extraction service.
pub struct HttpOutlineExtractor {
    client: Client,
    endpoint: Url,
    upload_field: String,
}

impl HttpOutlineExtractor {
    pub fn new(config: &PreviewConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.extraction_endpoint).with_context(|| {
            format!(
                "invalid extraction endpoint {:?}",
                config.extraction_endpoint
            )
        })?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            upload_field: config.upload_field.clone(),
        })
    }
}

#[async_trait]
impl OutlineExtractor for HttpOutlineExtractor {
    #[instrument(skip(self, document), fields(file = document.name(), bytes = document.len()))]
    async fn submit(&self, document: &SourceDocument) -> Result<Extraction, ExtractionError> {
        let part = Part::bytes(document.bytes().to_vec())
            .file_name(document.name().to_string())
            .mime_str(PDF_MIME)
            .map_err(|err| ExtractionError::Transport(err.to_string()))?;
        let form = Form::new().part(self.upload_field.clone(), part);

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|err| ExtractionError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "extraction service rejected the document");
            return Err(ExtractionError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| ExtractionError::Transport(err.to_string()))?;
        let extraction = parse_response(&body, &self.endpoint)?;
        debug!(
            entries = extraction.outline.len(),
            url = %extraction.document_url,
            "extraction succeeded"
        );
        Ok(extraction)
    }
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    outline: Vec<ResponseEntry>,
    pdf_url: String,
}

#[derive(Debug, Deserialize)]
struct ResponseEntry {
    text: String,
    level: String,
    #[serde(default, deserialize_with = "present")]
    page: Option<Value>,
}

/// Keeps an explicit `null` apart from a missing field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl From<ResponseEntry> for OutlineEntry {
    fn from(entry: ResponseEntry) -> Self {
        OutlineEntry {
            text: entry.text,
            level: HeadingLevel::parse(&entry.level),
            page: entry
                .page
                .as_ref()
                .map_or_else(PageRef::missing, PageRef::coerce),
        }
    }
}

/// Decodes a service response, coercing every page reference to a number and
/// resolving a relative document URL against `base`.
pub fn parse_response(body: &[u8], base: &Url) -> Result<Extraction, ExtractionError> {
    let response: ExtractionResponse = serde_json::from_slice(body)
        .map_err(|err| ExtractionError::MalformedResponse(err.to_string()))?;

    let raw_url = response.pdf_url.trim();
    if raw_url.is_empty() {
        return Err(ExtractionError::MalformedResponse(
            "pdf_url is empty".to_string(),
        ));
    }
    let document_url = resolve_document_url(raw_url, base)?;

    Ok(Extraction {
        outline: response.outline.into_iter().map(OutlineEntry::from).collect(),
        document_url,
    })
}

fn resolve_document_url(raw: &str, base: &Url) -> Result<String, ExtractionError> {
    match Url::parse(raw) {
        Ok(_) => Ok(raw.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .join(raw)
            .map(String::from)
            .map_err(|err| ExtractionError::MalformedResponse(format!("pdf_url {raw:?}: {err}"))),
        Err(err) => Err(ExtractionError::MalformedResponse(format!(
            "pdf_url {raw:?}: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn base() -> Url {
        Url::parse("http://localhost:8000/extract-outline").unwrap()
    }

    #[test]
    fn parse_coerces_pages_and_keeps_entries() {
        let body = br#"{
            "outline": [
                {"text": "Intro", "level": "H1", "page": 1},
                {"text": "Background", "level": "H2", "page": "3"},
                {"text": "Appendix", "level": "H3", "page": "n/a"},
                {"text": "Loose", "level": "H2"}
            ],
            "pdf_url": "http://localhost:8000/files/d.pdf"
        }"#;
        let extraction = parse_response(body, &base()).unwrap();
        assert_eq!(extraction.document_url, "http://localhost:8000/files/d.pdf");
        let pages: Vec<_> = extraction.outline.iter().map(|e| e.page.page()).collect();
        assert_eq!(pages, vec![Some(1), Some(3), None, None]);
        assert_eq!(extraction.outline[1].level, HeadingLevel::Numbered(2));
        assert_eq!(extraction.outline[1].text, "Background");
    }

    #[test]
    fn parse_tells_null_pages_from_missing_ones() {
        let body = br#"{
            "outline": [
                {"text": "Null", "level": "H1", "page": null},
                {"text": "Missing", "level": "H1"},
                {"text": "Flag", "level": "H1", "page": true}
            ],
            "pdf_url": "http://localhost:8000/files/d.pdf"
        }"#;
        let extraction = parse_response(body, &base()).unwrap();
        assert_eq!(extraction.outline[0].page.raw(), 0.0);
        assert!(extraction.outline[1].page.raw().is_nan());
        assert_eq!(extraction.outline[2].page.page(), Some(1));
    }

    #[test]
    fn parse_resolves_relative_urls_against_the_endpoint() {
        let body = br#"{"outline": [], "pdf_url": "/files/d.pdf"}"#;
        let extraction = parse_response(body, &base()).unwrap();
        assert_eq!(extraction.document_url, "http://localhost:8000/files/d.pdf");
    }

    #[test]
    fn parse_rejects_missing_fields() {
        for body in [
            &br#"{"pdf_url": "http://x/d.pdf"}"#[..],
            &br#"{"outline": []}"#[..],
            &br#"{"outline": [], "pdf_url": "   "}"#[..],
            &br#"{"outline": [{"level": "H1", "page": 1}], "pdf_url": "http://x/d.pdf"}"#[..],
            &b"<html>oops</html>"[..],
        ] {
            assert!(
                matches!(
                    parse_response(body, &base()),
                    Err(ExtractionError::MalformedResponse(_))
                ),
                "{}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn new_rejects_invalid_endpoint() {
        let config = PreviewConfig {
            extraction_endpoint: "not a url".into(),
            ..PreviewConfig::default()
        };
        assert!(HttpOutlineExtractor::new(&config).is_err());
    }

    /// Answers exactly one request with `status` and `body`, returning the
    /// raw request it received.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (Url, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        let url = Url::parse(&format!("http://{addr}/extract-outline")).unwrap();
        (url, server)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> Vec<u8> {
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = socket.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..read]);
            if request_complete(&request) {
                break;
            }
        }
        request
    }

    fn request_complete(request: &[u8]) -> bool {
        let Some(header_end) = find(request, b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
        let body = &request[header_end + 4..];
        if let Some(length) = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
        {
            return body.len() >= length;
        }
        if headers.contains("transfer-encoding: chunked") {
            return body.ends_with(b"0\r\n\r\n");
        }
        true
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    fn extractor_for(endpoint: &Url) -> HttpOutlineExtractor {
        HttpOutlineExtractor::new(&PreviewConfig {
            extraction_endpoint: endpoint.to_string(),
            request_timeout: Duration::from_secs(5),
            ..PreviewConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn submit_posts_multipart_and_decodes_outline() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"outline":[{"text":"Intro","level":"H1","page":"1"}],"pdf_url":"/files/report.pdf"}"#,
        )
        .await;
        let extractor = extractor_for(&endpoint);
        let document =
            SourceDocument::new("report.pdf", bytes::Bytes::from_static(b"%PDF-1.7 body"));

        let extraction = extractor.submit(&document).await.unwrap();
        assert_eq!(extraction.outline.len(), 1);
        assert_eq!(extraction.outline[0].page.page(), Some(1));
        assert_eq!(
            extraction.document_url,
            endpoint.join("/files/report.pdf").unwrap().to_string()
        );

        let request = String::from_utf8_lossy(&server.await.unwrap()).into_owned();
        assert!(request.starts_with("POST /extract-outline"));
        assert!(request.contains("name=\"pdf_file\""));
        assert!(request.contains("filename=\"report.pdf\""));
        assert!(request.contains("application/pdf"));
        assert!(request.contains("%PDF-1.7 body"));
    }

    #[tokio::test]
    async fn submit_maps_error_status() {
        let (endpoint, server) =
            serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        let extractor = extractor_for(&endpoint);
        let document = SourceDocument::new("report.pdf", b"%PDF".to_vec());

        let err = extractor.submit(&document).await.unwrap_err();
        assert_eq!(err, ExtractionError::Status { status: 500 });
        server.await.unwrap();
    }

    #[tokio::test]
    async fn submit_maps_unreachable_service_to_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let endpoint = Url::parse(&format!("http://{addr}/extract-outline")).unwrap();
        let extractor = extractor_for(&endpoint);

        let err = extractor
            .submit(&SourceDocument::new("report.pdf", b"%PDF".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Transport(_)));
    }
}
