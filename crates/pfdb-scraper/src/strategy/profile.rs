use crate::client::UpstreamClient;
use crate::error::ScraperError;
use crate::meta::{extract_meta_profile, extract_shared_data_user};
use crate::types::{GraphUser, RawContent, RawProfile};

/// Query string of the profile page JSON variant tried second.
pub(crate) const PROFILE_PAGE_VARIANT: &[(&str, &str)] = &[("__a", "1"), ("__d", "dis")];

/// A raw profile plus whatever timeline page came embedded with it.
#[derive(Debug, Clone)]
pub(crate) struct RawProfileFetch {
    pub raw: RawProfile,
    pub seed: Vec<RawContent>,
    pub seed_cursor: Option<String>,
}

impl RawProfileFetch {
    fn from_graph(user: GraphUser) -> Self {
        let (seed, seed_cursor) = match &user.edge_owner_to_timeline_media {
            Some(media) => (
                media
                    .edges
                    .iter()
                    .map(|e| RawContent::Graph(e.node.clone()))
                    .collect(),
                media.next_cursor(),
            ),
            None => (Vec::new(), None),
        };
        Self {
            raw: RawProfile::Graph(user),
            seed,
            seed_cursor,
        }
    }
}

/// Profile sources in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStrategy {
    WebProfileInfo,
    ProfilePageJson,
    HtmlPage,
}

impl ProfileStrategy {
    pub const ALL: [ProfileStrategy; 3] = [
        ProfileStrategy::WebProfileInfo,
        ProfileStrategy::ProfilePageJson,
        ProfileStrategy::HtmlPage,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ProfileStrategy::WebProfileInfo => "web_profile_info",
            ProfileStrategy::ProfilePageJson => "profile_page_json",
            ProfileStrategy::HtmlPage => "html_page",
        }
    }

    pub(crate) async fn fetch(
        self,
        client: &UpstreamClient,
        handle: &str,
    ) -> Result<RawProfileFetch, ScraperError> {
        match self {
            ProfileStrategy::WebProfileInfo => {
                let response = client.web_profile_info(handle).await?;
                let user = response
                    .data
                    .and_then(|d| d.user)
                    .ok_or_else(|| malformed(self, "response has no data.user"))?;
                Ok(RawProfileFetch::from_graph(user))
            }
            ProfileStrategy::ProfilePageJson => {
                let response = client.profile_page_json(handle, PROFILE_PAGE_VARIANT).await?;
                let user = response
                    .graphql
                    .and_then(|g| g.user)
                    .ok_or_else(|| malformed(self, "response has no graphql.user"))?;
                Ok(RawProfileFetch::from_graph(user))
            }
            ProfileStrategy::HtmlPage => {
                let html = client.profile_html(handle).await?;
                if let Some(user) = extract_shared_data_user(&html) {
                    return Ok(RawProfileFetch::from_graph(user));
                }
                let meta = extract_meta_profile(&html, handle)
                    .ok_or_else(|| malformed(self, "page has neither _sharedData nor og: tags"))?;
                Ok(RawProfileFetch {
                    raw: RawProfile::Meta(meta),
                    seed: Vec::new(),
                    seed_cursor: None,
                })
            }
        }
    }
}

fn malformed(strategy: ProfileStrategy, reason: &str) -> ScraperError {
    ScraperError::Malformed {
        context: strategy.name().to_owned(),
        reason: reason.to_owned(),
    }
}
