//! User-Agent string for crawler HTTP traffic.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/topicmap";

/// Default User-Agent for page requests (identifies the tool).
#[must_use]
pub(crate) fn default_crawler_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("topicmap/{version} (research-metadata-crawler; +{PROJECT_UA_URL})")
}
