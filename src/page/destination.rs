use crate::core::{FrameworkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

pub type Parameters = BTreeMap<String, String>;

/// Identity of the entity a page belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity_type: String,
    pub parameters: Parameters,
}

impl EntityInfo {
    pub fn new(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            parameters: Parameters::new(),
        }
    }

    pub fn parameter(mut self, key: &str, value: impl ToString) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }
}

/// A resolved page: its type, parameters and access requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page_type: String,
    pub entity: Option<EntityInfo>,
    pub parameters: Parameters,
    pub should_be_secure: bool,
    /// Set when the page is in its disabled alternative mode
    pub disabled_message: Option<String>,
    /// Reachable on intermediate installations without the intermediate log-in
    pub intermediate_public: bool,
}

impl PageInfo {
    pub fn new(page_type: &str) -> Self {
        Self {
            page_type: page_type.to_string(),
            entity: None,
            parameters: Parameters::new(),
            should_be_secure: false,
            disabled_message: None,
            intermediate_public: false,
        }
    }

    pub fn parameter(mut self, key: &str, value: impl ToString) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn entity(mut self, entity: EntityInfo) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn secure(mut self, should_be_secure: bool) -> Self {
        self.should_be_secure = should_be_secure;
        self
    }

    pub fn disabled(mut self, message: &str) -> Self {
        self.disabled_message = Some(message.to_string());
        self
    }

    pub fn intermediate_public(mut self, public: bool) -> Self {
        self.intermediate_public = public;
        self
    }

    /// Same page type, entity and parameters
    pub fn is_identical_to(&self, other: &PageInfo) -> bool {
        self.page_type == other.page_type
            && self.entity == other.entity
            && self.parameters == other.parameters
    }

    /// Entity and page parameters together, as they appear in the URL
    pub fn query_parameters(&self) -> Parameters {
        let mut parameters = self
            .entity
            .as_ref()
            .map(|e| e.parameters.clone())
            .unwrap_or_default();
        parameters.extend(self.parameters.clone());
        parameters
    }

    /// Relative URL; entity parameters come before page parameters
    pub fn url(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(entity) = &self.entity {
            query.extend_pairs(&entity.parameters);
        }
        query.extend_pairs(&self.parameters);
        let query = query.finish();

        let path = format!("/pages/{}", self.page_type);
        if query.is_empty() {
            path
        } else {
            format!("{}?{}", path, query)
        }
    }
}

/// Where a post-back sends the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Page(PageInfo),
    External(String),
}

impl Destination {
    pub fn url(&self) -> String {
        match self {
            Destination::Page(info) => info.url(),
            Destination::External(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Re-run the lifecycle for the current page in this request
    Transfer,
    Redirect {
        url: String,
        /// Keep the lifecycle state in the session for the next request
        preserve_state: bool,
    },
}

/// Transfer when the destination is the current page, redirect otherwise
pub fn decide_navigation(destination: &Destination, current: &PageInfo) -> Navigation {
    match destination {
        Destination::Page(info) if info.is_identical_to(current) => Navigation::Transfer,
        Destination::Page(info) => Navigation::Redirect {
            url: info.url(),
            preserve_state: info.page_type == current.page_type,
        },
        Destination::External(url) => Navigation::Redirect {
            url: url.clone(),
            preserve_state: false,
        },
    }
}

/// The request URL with its scheme switched to match `secure`
pub fn url_with_security(request_url: &str, secure: bool) -> Result<String> {
    let mut url = Url::parse(request_url)
        .map_err(|e| FrameworkError::developer(format!("Invalid request URL '{}': {}", request_url, e)))?;
    let scheme = if secure { "https" } else { "http" };
    url.set_scheme(scheme).map_err(|()| {
        FrameworkError::developer(format!("Cannot switch '{}' to {}", request_url, scheme))
    })?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: u64) -> PageInfo {
        PageInfo::new("profile").parameter("user", id)
    }

    #[test]
    fn test_url_includes_entity_and_page_parameters() {
        let info = PageInfo::new("report")
            .entity(EntityInfo::new("company").parameter("company", 7))
            .parameter("year", 2024)
            .parameter("q", "a b&c");
        assert_eq!(info.url(), "/pages/report?company=7&q=a+b%26c&year=2024");
        assert_eq!(info.query_parameters().len(), 3);
        assert_eq!(PageInfo::new("home").url(), "/pages/home");
    }

    #[test]
    fn test_identity_ignores_access_flags() {
        assert!(profile(1).is_identical_to(&profile(1).secure(true)));
        assert!(!profile(1).is_identical_to(&profile(2)));
        assert!(!profile(1).is_identical_to(&PageInfo::new("home").parameter("user", 1)));
    }

    #[test]
    fn test_identical_destination_transfers() {
        assert_eq!(
            decide_navigation(&Destination::Page(profile(1)), &profile(1)),
            Navigation::Transfer
        );
    }

    #[test]
    fn test_different_destination_redirects() {
        assert_eq!(
            decide_navigation(&Destination::Page(profile(2)), &profile(1)),
            Navigation::Redirect {
                url: "/pages/profile?user=2".into(),
                preserve_state: true
            }
        );
        assert_eq!(
            decide_navigation(&Destination::Page(PageInfo::new("home")), &profile(1)),
            Navigation::Redirect {
                url: "/pages/home".into(),
                preserve_state: false
            }
        );
        assert_eq!(
            decide_navigation(
                &Destination::External("https://example.com/".into()),
                &profile(1)
            ),
            Navigation::Redirect {
                url: "https://example.com/".into(),
                preserve_state: false
            }
        );
    }

    #[test]
    fn test_url_with_security() {
        assert_eq!(
            url_with_security("http://localhost:8080/pages/home?x=1", true).unwrap(),
            "https://localhost:8080/pages/home?x=1"
        );
        assert_eq!(
            url_with_security("https://example.com/pages/home", false).unwrap(),
            "http://example.com/pages/home"
        );
        assert!(url_with_security("not a url", true).is_err());
    }
}
