//! HTTP/JSON clients for the OCR, Q&A, parser and rasterizer services
//!
//! Every service receives the page as base64 in a JSON body. The blocking
//! client is built per call since calls only happen on the blocking pool.
//! Connection failures, timeouts and `503` answers mean the service is
//! unavailable; any other failure only fails the call at hand.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use docfield_core::{
    CollaboratorError, DocumentFormat, DocumentParser, ImageSize, LazyModel, OcrEngine, PageImage,
    QaAnswer, QaModel, Rasterizer, RawOcrToken,
};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Base URL and timeout of one backend service
#[derive(Clone, Debug)]
pub struct Endpoint {
    service: &'static str,
    base_url: String,
    timeout: Duration,
}

impl Endpoint {
    pub fn new(service: &'static str, base_url: &str, timeout: Duration) -> Self {
        Self {
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn client(&self) -> Result<Client, CollaboratorError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| CollaboratorError::unavailable(self.service, e.to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> CollaboratorError {
        if e.is_connect() || e.is_timeout() {
            CollaboratorError::unavailable(self.service, e.to_string())
        } else {
            CollaboratorError::failed(self.service, e.to_string())
        }
    }

    fn check_status(
        &self,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, CollaboratorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let message = format!("{} answered {}: {}", self.base_url, status, body.trim());
        if status == StatusCode::SERVICE_UNAVAILABLE {
            Err(CollaboratorError::unavailable(self.service, message))
        } else {
            Err(CollaboratorError::failed(self.service, message))
        }
    }

    fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, CollaboratorError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self
            .client()?
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.transport_error(e))?;
        self.check_status(response)?.json().map_err(|e| {
            CollaboratorError::failed(self.service, format!("Invalid JSON from {}: {}", url, e))
        })
    }

    /// `GET /health`; any successful answer counts as ready
    pub fn probe(&self) -> Result<(), CollaboratorError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client()?
            .get(&url)
            .send()
            .map_err(|e| self.transport_error(e))?;
        match self.check_status(response) {
            Ok(_) => Ok(()),
            Err(CollaboratorError::Failed { message, .. }) => {
                Err(CollaboratorError::unavailable(self.service, message))
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Serialize)]
struct ImageBody {
    image: String,
    format: String,
    width: u32,
    height: u32,
}

impl ImageBody {
    fn new(page: &PageImage) -> Self {
        Self {
            image: BASE64.encode(&page.bytes),
            format: page.format.to_string(),
            width: page.size.width,
            height: page.size.height,
        }
    }
}

pub struct RemoteOcr {
    endpoint: Endpoint,
}

impl RemoteOcr {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[derive(Deserialize)]
struct OcrResponse {
    #[serde(default)]
    words: Vec<RawOcrToken>,
}

impl OcrEngine for RemoteOcr {
    fn recognize(&self, page: &PageImage) -> Result<Vec<RawOcrToken>, CollaboratorError> {
        let response: OcrResponse = self
            .endpoint
            .post("/ocr", &ImageBody::new(page))?;
        Ok(response.words)
    }
}

pub struct RemoteQa {
    endpoint: Endpoint,
}

impl RemoteQa {
    /// Lazily connected handle; the first use probes the service
    pub fn lazy(endpoint: Endpoint) -> LazyModel<dyn QaModel> {
        LazyModel::new("layoutlm", move || {
            endpoint.probe()?;
            info!("Q&A model service ready at {}", endpoint.base_url);
            Ok(Arc::new(RemoteQa {
                endpoint: endpoint.clone(),
            }) as Arc<dyn QaModel>)
        })
    }
}

#[derive(Serialize)]
struct QaBody<'a> {
    #[serde(flatten)]
    image: ImageBody,
    question: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct QaResponse {
    #[serde(default)]
    answers: Vec<QaAnswer>,
}

impl QaModel for RemoteQa {
    fn ask(
        &self,
        page: &PageImage,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<QaAnswer>, CollaboratorError> {
        let body = QaBody {
            image: ImageBody::new(page),
            question,
            top_k,
        };
        let response: QaResponse = self.endpoint.post("/qa", &body)?;
        Ok(response.answers)
    }
}

pub struct RemoteParser {
    endpoint: Endpoint,
}

impl RemoteParser {
    pub fn lazy(endpoint: Endpoint) -> LazyModel<dyn DocumentParser> {
        LazyModel::new("donut", move || {
            endpoint.probe()?;
            info!("Document parser service ready at {}", endpoint.base_url);
            Ok(Arc::new(RemoteParser {
                endpoint: endpoint.clone(),
            }) as Arc<dyn DocumentParser>)
        })
    }
}

#[derive(Deserialize)]
struct ParseResponse {
    #[serde(default)]
    result: serde_json::Value,
}

impl DocumentParser for RemoteParser {
    fn parse(&self, page: &PageImage) -> Result<serde_json::Value, CollaboratorError> {
        let response: ParseResponse = self
            .endpoint
            .post("/extract", &ImageBody::new(page))?;
        Ok(response.result)
    }
}

pub struct RemoteRasterizer {
    endpoint: Endpoint,
}

impl RemoteRasterizer {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[derive(Serialize)]
struct RasterizeBody {
    document: String,
}

#[derive(Deserialize)]
struct RasterizeResponse {
    image: String,
    width: u32,
    height: u32,
}

impl Rasterizer for RemoteRasterizer {
    fn rasterize(&self, pdf: &[u8]) -> Result<PageImage, CollaboratorError> {
        let response: RasterizeResponse = self.endpoint.post(
            "/rasterize",
            &RasterizeBody {
                document: BASE64.encode(pdf),
            },
        )?;
        let bytes = BASE64.decode(response.image.trim()).map_err(|e| {
            CollaboratorError::failed("rasterizer", format!("Invalid page image: {}", e))
        })?;
        Ok(PageImage::with_size(
            bytes,
            DocumentFormat::Png,
            ImageSize::new(response.width, response.height),
        ))
    }
}
