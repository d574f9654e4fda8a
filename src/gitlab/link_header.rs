use url::Url;

use crate::error::{CigraphError, Result};

/// One element of an RFC 8288 `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHeader {
    pub link: Url,
    pub rel: String,
}

/// Finds the link with `rel="next"`, which GitLab uses to hand out the next
/// keyset-pagination URL.
pub fn next_link(headers: &[LinkHeader]) -> Option<&LinkHeader> {
    headers.iter().find(|lh| lh.rel == "next")
}

/// Parses a comma-separated list of RFC 8288 link elements.
pub fn parse_link_headers(header: &str) -> Result<Vec<LinkHeader>> {
    header
        .split(',')
        .map(|element| parse_link_header(element.trim()))
        .collect()
}

/// An incomplete parser for RFC 8288 header elements. It makes heavy
/// assumptions around how GitLab uses web linking for keyset pagination,
/// see <https://docs.gitlab.com/ee/api/projects.html#list-all-projects>.
fn parse_link_header(element: &str) -> Result<LinkHeader> {
    let invalid = || CigraphError::InvalidLinkHeader {
        header: element.to_string(),
    };

    let (target, params) = element.split_once(';').ok_or_else(invalid)?;

    let target = target.trim();
    let inner = target
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .ok_or_else(invalid)?;

    let link = Url::parse(inner).map_err(|_| invalid())?;

    let rel = params
        .trim()
        .strip_prefix("rel=")
        .ok_or_else(invalid)?
        .trim_matches('"')
        .to_string();

    Ok(LinkHeader { link, rel })
}
