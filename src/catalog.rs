//! Category catalog and onboarding config, fetched from the marketplace API
//! or loaded from a local JSON file.

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::validation::DEFAULT_MINIMUM_DESIGNS;

/// Largest API response body accepted (5 MB)
pub const MAX_RESPONSE_SIZE: u64 = 5 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ONBOARDING_CONFIG_PATH: &str = "api/designers/onboarding/config/";
const CATEGORIES_PATH: &str = "api/catalog/categories/";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("network error for {url}: {detail}")]
    Transport { url: String, detail: String },

    #[error("HTTP error {code} for {url}")]
    Status { url: String, code: u16 },

    #[error("response from {url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog file: {0}")]
    InvalidFile(#[source] serde_json::Error),

    #[error("{0} is not available from this catalog")]
    Unavailable(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: u64,
    pub name: String,
}

/// Where categories and the onboarding threshold come from
pub trait CatalogSource {
    /// Minimum number of complete designs an onboarding upload must contain
    fn minimum_designs(&self) -> Result<usize, CatalogError>;

    fn categories(&self) -> Result<Vec<Category>, CatalogError>;

    fn subcategories(&self, category_id: u64) -> Result<Vec<Subcategory>, CatalogError>;
}

/// Every category paired with its subcategories, in catalog order.
pub fn load_tree(source: &dyn CatalogSource) -> Result<Vec<(Category, Vec<Subcategory>)>, CatalogError> {
    let categories = source.categories()?;
    let mut tree = Vec::with_capacity(categories.len());
    for category in categories {
        let subcategories = source.subcategories(category.id)?;
        tracing::debug!(category = %category.name, count = subcategories.len(), "loaded subcategories");
        tree.push((category, subcategories));
    }
    Ok(tree)
}

/// List endpoints answer with a bare array or a paginated/wrapped object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListPayload<T> {
    Bare(Vec<T>),
    Results { results: Vec<T> },
    Data { data: Vec<T> },
}

impl<T> ListPayload<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListPayload::Bare(items) => items,
            ListPayload::Results { results } => results,
            ListPayload::Data { data } => data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OnboardingConfig {
    minimum_required_designs_onboard: Option<usize>,
}

/// Catalog backed by the marketplace REST API
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    base: Url,
}

impl HttpCatalog {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        Ok(self.base.join(path)?)
    }

    fn subcategories_endpoint(&self, category_id: u64) -> Result<Url, CatalogError> {
        self.endpoint(&format!("{}{}/subcategories/", CATEGORIES_PATH, category_id))
    }

    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, CatalogError> {
        tracing::debug!(%url, "requesting catalog endpoint");
        let body = fetch_with_limit(url, MAX_RESPONSE_SIZE)?;
        decode(url, &body)
    }
}

impl CatalogSource for HttpCatalog {
    fn minimum_designs(&self) -> Result<usize, CatalogError> {
        let url = self.endpoint(ONBOARDING_CONFIG_PATH)?;
        let config: OnboardingConfig = self.get_json(&url)?;
        config
            .minimum_required_designs_onboard
            .ok_or(CatalogError::Unavailable("minimum_required_designs_onboard"))
    }

    fn categories(&self) -> Result<Vec<Category>, CatalogError> {
        let url = self.endpoint(CATEGORIES_PATH)?;
        let payload: ListPayload<Category> = self.get_json(&url)?;
        Ok(payload.into_items())
    }

    fn subcategories(&self, category_id: u64) -> Result<Vec<Subcategory>, CatalogError> {
        let url = self.subcategories_endpoint(category_id)?;
        let payload: ListPayload<Subcategory> = self.get_json(&url)?;
        Ok(payload.into_items())
    }
}

fn decode<T: DeserializeOwned>(url: &Url, body: &str) -> Result<T, CatalogError> {
    serde_json::from_str(body).map_err(|source| CatalogError::Decode {
        url: url.to_string(),
        source,
    })
}

/// GET `url` and read at most `max_size` bytes of the body.
fn fetch_with_limit(url: &Url, max_size: u64) -> Result<String, CatalogError> {
    let response = ureq::get(url.as_str())
        .timeout(REQUEST_TIMEOUT)
        .call()
        .map_err(|e| match e {
            ureq::Error::Status(code, _) => CatalogError::Status {
                url: url.to_string(),
                code,
            },
            ureq::Error::Transport(t) => CatalogError::Transport {
                url: url.to_string(),
                detail: t.to_string(),
            },
        })?;

    let too_large = || CatalogError::TooLarge {
        url: url.to_string(),
        limit: max_size,
    };

    if let Some(content_length) = response
        .header("Content-Length")
        .and_then(|s| s.parse::<u64>().ok())
    {
        if content_length > max_size {
            return Err(too_large());
        }
    }

    let mut body = String::new();
    response
        .into_reader()
        .take(max_size + 1)
        .read_to_string(&mut body)
        .map_err(|e| CatalogError::Transport {
            url: url.to_string(),
            detail: format!("failed to read response: {}", e),
        })?;

    if body.len() as u64 > max_size {
        return Err(too_large());
    }

    Ok(body)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

/// In-memory catalog, usually loaded from a JSON file:
///
/// ```json
/// {
///   "minimum_required_designs_onboard": 50,
///   "categories": [
///     { "id": 1, "name": "Floral", "subcategories": [{ "id": 10, "name": "Roses" }] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default, rename = "minimum_required_designs_onboard")]
    pub minimum: Option<usize>,
    #[serde(default)]
    pub categories: Vec<CatalogEntry>,
}

impl StaticCatalog {
    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(content).map_err(CatalogError::InvalidFile)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

impl CatalogSource for StaticCatalog {
    fn minimum_designs(&self) -> Result<usize, CatalogError> {
        self.minimum
            .ok_or(CatalogError::Unavailable("minimum_required_designs_onboard"))
    }

    fn categories(&self) -> Result<Vec<Category>, CatalogError> {
        Ok(self
            .categories
            .iter()
            .map(|entry| Category {
                id: entry.id,
                name: entry.name.clone(),
            })
            .collect())
    }

    fn subcategories(&self, category_id: u64) -> Result<Vec<Subcategory>, CatalogError> {
        Ok(self
            .categories
            .iter()
            .find(|entry| entry.id == category_id)
            .map(|entry| entry.subcategories.clone())
            .unwrap_or_default())
    }
}

/// The onboarding threshold, resolved once and reused for the session.
///
/// Resolution order: explicit override, catalog endpoint, then
/// [`DEFAULT_MINIMUM_DESIGNS`].
#[derive(Debug, Default)]
pub struct MinimumDesigns {
    override_value: Option<usize>,
    resolved: OnceCell<usize>,
}

impl MinimumDesigns {
    pub fn new(override_value: Option<usize>) -> Self {
        Self {
            override_value,
            resolved: OnceCell::new(),
        }
    }

    pub fn resolve(&self, source: Option<&dyn CatalogSource>) -> usize {
        *self.resolved.get_or_init(|| {
            if let Some(value) = self.override_value {
                return value;
            }
            let Some(source) = source else {
                return DEFAULT_MINIMUM_DESIGNS;
            };
            match source.minimum_designs() {
                Ok(value) => {
                    tracing::info!(minimum = value, "fetched onboarding threshold");
                    value
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        default = DEFAULT_MINIMUM_DESIGNS,
                        "could not fetch onboarding threshold, using default"
                    );
                    DEFAULT_MINIMUM_DESIGNS
                }
            }
        })
    }
}
