//! Resources: immutable descriptions of one network operation.
//!
//! # Design
//! The three resource kinds share a `ResourceInfo` (url, method, headers,
//! authorization flag, correlation id) and differ only in payload:
//!
//! - `DataResource<T>` parses the response bytes into `T`.
//! - `DownloadResource` streams the response into a named file.
//! - `UploadResource` streams a local file as the request body.
//!
//! The set is closed; the façade dispatches on `TaskKind` rather than on
//! the runtime type of a parsed value. Image-producing data resources say so
//! up front through an `ImageHook`.
//!
//! Resources are built with consuming `with_*` methods and never change
//! afterwards. `with_id` derives a copy carrying a new correlation id.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use crate::error::NetworkError;
use crate::http::{HttpMethod, HttpRequest};
use crate::image_cache::Image;
use crate::task_identifier::{TaskIdentifier, TaskKind};

/// Error returned by a parse function.
pub type ParseError = Box<dyn StdError + Send + Sync>;

type ParseFn<T> = Arc<dyn Fn(&[u8]) -> Result<Option<T>, ParseError> + Send + Sync>;

/// Common header values.
pub mod mime {
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const JSON: &str = "application/json";
    pub const URL_ENCODED: &str = "application/x-www-form-urlencoded";
    pub const IMAGE_JPEG: &str = "image/jpeg";
    pub const IMAGE_PNG: &str = "image/png";
    pub const PDF: &str = "application/pdf";

    pub fn multipart(boundary: &str) -> String {
        format!("multipart/form-data; boundary={boundary}")
    }
}

/// Request headers declared by a resource. `None` means "do not send".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub other: BTreeMap<String, String>,
}

impl Headers {
    fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(accept) = &self.accept {
            pairs.push(("Accept".to_string(), accept.clone()));
        }
        if let Some(content_type) = &self.content_type {
            pairs.push(("Content-Type".to_string(), content_type.clone()));
        }
        pairs.extend(self.other.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

/// The surface every resource kind shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    url: String,
    method: HttpMethod,
    headers: Headers,
    authorization_needed: bool,
    id: Uuid,
}

impl ResourceInfo {
    fn new(url: String, method: HttpMethod) -> Self {
        Self {
            url,
            method,
            headers: Headers::default(),
            authorization_needed: true,
            id: Uuid::new_v4(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn authorization_needed(&self) -> bool {
        self.authorization_needed
    }

    /// Correlation id tying the resource, its authorization step and its transport task together.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Turn the resource description into a request.
    pub(crate) fn build_request(&self, body: Option<Vec<u8>>) -> Result<HttpRequest, NetworkError> {
        let url = Url::parse(&self.url).map_err(|e| NetworkError::InvalidUrl(format!("{}: {e}", self.url)))?;
        Ok(HttpRequest {
            method: self.method,
            url,
            headers: self.headers.to_pairs(),
            body,
        })
    }
}

/// Behavior shared by the three resource kinds.
pub trait Resource {
    fn info(&self) -> &ResourceInfo;

    fn kind(&self) -> TaskKind;

    /// Value carried in the task identifier's auxiliary field.
    fn auxiliary(&self) -> Option<String> {
        None
    }

    fn task_identifier(&self) -> TaskIdentifier {
        TaskIdentifier::new(self.kind(), self.info().id(), self.auxiliary())
    }
}

macro_rules! info_builders {
    () => {
        pub fn with_headers(mut self, headers: Headers) -> Self {
            self.info.headers = headers;
            self
        }

        pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
            self.info.headers.content_type = Some(content_type.into());
            self
        }

        pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
            self.info.headers.accept = Some(accept.into());
            self
        }

        pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
            self.info.headers.other.insert(name.into(), value.into());
            self
        }

        pub fn with_authorization_needed(mut self, needed: bool) -> Self {
            self.info.authorization_needed = needed;
            self
        }

        /// Derive a copy with another correlation id. `self` is untouched.
        pub fn with_id(&self, id: Uuid) -> Self {
            let mut derived = self.clone();
            derived.info.id = id;
            derived
        }

        pub fn info(&self) -> &ResourceInfo {
            &self.info
        }
    };
}

/// Converts a parsed value to and from the image cache representation.
pub struct ImageHook<T> {
    pub to_image: fn(&T) -> Option<Image>,
    pub from_image: fn(&Image) -> T,
}

impl<T> Clone for ImageHook<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ImageHook<T> {}

/// A request whose response body is parsed into `T`.
pub struct DataResource<T> {
    info: ResourceInfo,
    body: Option<Vec<u8>>,
    parse: ParseFn<T>,
    image: Option<ImageHook<T>>,
}

impl<T> Clone for DataResource<T> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            body: self.body.clone(),
            parse: Arc::clone(&self.parse),
            image: self.image,
        }
    }
}

impl<T> fmt::Debug for DataResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataResource")
            .field("info", &self.info)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("caches_images", &self.image.is_some())
            .finish()
    }
}

impl<T> DataResource<T> {
    pub fn new<F>(url: impl Into<String>, method: HttpMethod, parse: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Option<T>, ParseError> + Send + Sync + 'static,
    {
        Self {
            info: ResourceInfo::new(url.into(), method),
            body: None,
            parse: Arc::new(parse),
            image: None,
        }
    }

    info_builders!();

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Declare the resource image-producing so results go through the image cache.
    pub fn with_image_hook(mut self, hook: ImageHook<T>) -> Self {
        self.image = Some(hook);
        self
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn image_hook(&self) -> Option<ImageHook<T>> {
        self.image
    }

    pub fn parse(&self, data: &[u8]) -> Result<Option<T>, ParseError> {
        (self.parse)(data)
    }
}

impl<T: DeserializeOwned> DataResource<T> {
    /// A resource whose response is JSON-decoded into `T`.
    pub fn json(url: impl Into<String>, method: HttpMethod) -> Self {
        Self::new(url, method, |data| Ok(Some(serde_json::from_slice(data)?))).with_accept(mime::JSON)
    }
}

impl DataResource<Image> {
    /// A GET resource decoded into an [`Image`] and served from the image cache when possible.
    pub fn image(url: impl Into<String>) -> Self {
        Self::new(url, HttpMethod::Get, |data| Ok(Some(Image::decode(data)?))).with_image_hook(ImageHook {
            to_image: |image| Some(image.clone()),
            from_image: Image::clone,
        })
    }
}

impl<T> Resource for DataResource<T> {
    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Data
    }
}

/// A request whose response is streamed into `file_name` in durable storage.
#[derive(Debug, Clone)]
pub struct DownloadResource {
    info: ResourceInfo,
    body: Option<Vec<u8>>,
    file_name: String,
}

impl DownloadResource {
    pub fn new(url: impl Into<String>, method: HttpMethod, file_name: impl Into<String>) -> Self {
        Self {
            info: ResourceInfo::new(url.into(), method),
            body: None,
            file_name: file_name.into(),
        }
    }

    info_builders!();

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl Resource for DownloadResource {
    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Download
    }

    fn auxiliary(&self) -> Option<String> {
        Some(self.file_name.clone())
    }
}

/// A request whose body is the content of `file_path`.
#[derive(Debug, Clone)]
pub struct UploadResource {
    info: ResourceInfo,
    file_path: PathBuf,
}

impl UploadResource {
    pub fn new(url: impl Into<String>, method: HttpMethod, file_path: impl Into<PathBuf>) -> Self {
        Self {
            info: ResourceInfo::new(url.into(), method),
            file_path: file_path.into(),
        }
    }

    info_builders!();

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Reads the file on every call; `None` when it cannot be read.
    pub fn body(&self) -> Option<Vec<u8>> {
        std::fs::read(&self.file_path).ok()
    }
}

impl Resource for UploadResource {
    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Upload
    }

    fn auxiliary(&self) -> Option<String> {
        Some(self.file_path.to_string_lossy().into_owned())
    }
}

/// A random multipart boundary such as `XXXQWERTYUIOPXXX`.
pub fn random_boundary() -> String {
    let letters: String = Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(10)
        .map(|b| char::from(b'A' + b % 26))
        .collect();
    format!("XXX{letters}XXX")
}

/// Wrap `data` as a single-part `multipart/form-data` body.
pub fn multipart_form_data(data: &[u8], boundary: &str, mime_type: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 160);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition:form-data; name=\"file\"; filename=\"data.jpg\"\r\n");
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Product {
        name: String,
    }

    #[test]
    fn defaults_require_authorization_and_fresh_ids() {
        let a = DownloadResource::new("http://localhost/a", HttpMethod::Get, "a.txt");
        let b = DownloadResource::new("http://localhost/a", HttpMethod::Get, "a.txt");
        assert!(a.info().authorization_needed());
        assert_ne!(a.info().id(), b.info().id());
    }

    #[test]
    fn with_id_does_not_touch_the_original() {
        let original = UploadResource::new("http://localhost/up", HttpMethod::Post, "/tmp/x.bin");
        let id = Uuid::new_v4();
        let derived = original.with_id(id);
        assert_eq!(derived.info().id(), id);
        assert_ne!(original.info().id(), id);
        assert_eq!(derived.file_path(), original.file_path());
    }

    #[test]
    fn build_request_orders_headers() {
        let resource = DataResource::<Product>::json("http://localhost:3000/products", HttpMethod::Post)
            .with_content_type(mime::JSON)
            .with_header("X-Trace", "1")
            .with_body(b"{}".to_vec());
        let req = resource.info().build_request(resource.body().map(<[u8]>::to_vec)).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url.as_str(), "http://localhost:3000/products");
        assert_eq!(
            req.headers,
            vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(req.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn unparseable_url_is_invalid_url() {
        let resource = DownloadResource::new("not a url", HttpMethod::Get, "a.txt");
        let err = resource.info().build_request(None).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl(_)));
    }

    #[test]
    fn json_resource_parses_body() {
        let resource = DataResource::<Product>::json("http://localhost/p", HttpMethod::Get);
        let parsed = resource.parse(br#"{"name":"Apple"}"#).unwrap();
        assert_eq!(parsed, Some(Product { name: "Apple".into() }));
        assert!(resource.parse(b"not json").is_err());
        assert!(resource.image_hook().is_none());
    }

    #[test]
    fn auxiliary_carries_file_name_and_path() {
        let download = DownloadResource::new("http://localhost/f", HttpMethod::Get, "report.pdf");
        assert_eq!(download.task_identifier().auxiliary.as_deref(), Some("report.pdf"));
        assert_eq!(download.task_identifier().kind, TaskKind::Download);

        let upload = UploadResource::new("http://localhost/u", HttpMethod::Put, "/data/photo.jpg");
        assert_eq!(upload.task_identifier().auxiliary.as_deref(), Some("/data/photo.jpg"));

        let data = DataResource::<Product>::json("http://localhost/p", HttpMethod::Get);
        assert_eq!(data.task_identifier().auxiliary, None);
    }

    #[test]
    fn multipart_body_layout() {
        let body = multipart_form_data(b"IMG", "XXXABCXXX", mime::IMAGE_JPEG);
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--XXXABCXXX\r\n"));
        assert!(text.contains("Content-Type: image/jpeg\r\n\r\nIMG\r\n"));
        assert!(text.ends_with("--XXXABCXXX--"));
    }

    #[test]
    fn random_boundary_shape() {
        let boundary = random_boundary();
        assert_eq!(boundary.len(), 16);
        assert!(boundary.starts_with("XXX") && boundary.ends_with("XXX"));
        assert!(boundary[3..13].chars().all(|c| c.is_ascii_uppercase()));
    }
}
