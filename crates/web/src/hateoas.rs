use std::sync::Arc;

use axum::Json;
use schemars::JsonSchema;
use serde::Serialize;

use crate::middleware::base_url::BaseUrl;

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct Link {
    #[serde(rename = "rel")]
    pub relation: String,

    #[serde(rename = "href")]
    pub hypertext_reference: String,
}

/// A resource together with links to the resources related to it.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Response<T> {
    #[serde(flatten)]
    pub content: T,
    pub links: Vec<Link>,
}

impl<T> Response<T> {
    pub fn builder(content: T, base_url: Arc<BaseUrl>) -> ResponseBuilder<T> {
        ResponseBuilder {
            response: Self {
                content,
                links: vec![],
            },
            base_url,
        }
    }

    pub fn json(self) -> Json<Self> {
        Json(self)
    }
}

pub struct ResponseBuilder<T> {
    response: Response<T>,
    base_url: Arc<BaseUrl>,
}

impl<T> ResponseBuilder<T> {
    /// Links a resource of this server, `path` starting at the root.
    pub fn link(mut self, relation: impl Into<String>, path: impl Into<String>) -> Self {
        self.response.links.push(Link {
            relation: relation.into(),
            hypertext_reference: self.base_url.full_url(path),
        });
        self
    }

    pub fn link_if(self, condition: bool, relation: &str, path: impl Into<String>) -> Self {
        if condition {
            self.link(relation, path)
        } else {
            self
        }
    }

    pub fn build(self) -> Response<T> {
        self.response
    }
}
