//! Choosing which peers a round tests.

use std::net::IpAddr;

use crate::overlay::{OverlayStatus, PeerStatus};

/// A peer chosen for testing, captured at round start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedPeer {
    pub name: String,
    pub addr: IpAddr,
}

/// Online, addressable peers that pass the target or filter.
///
/// A non-empty `target` keeps only the exact (case-insensitive) name match
/// and disables `filter`. Otherwise a non-empty `filter` keeps peers whose
/// display name contains it, ignoring case.
pub fn select_peers(
    status: &OverlayStatus,
    target: Option<&str>,
    filter: Option<&str>,
) -> Vec<SelectedPeer> {
    let target = target.filter(|t| !t.is_empty());
    let filter = filter.filter(|f| !f.is_empty());

    status
        .peers()
        .filter(|ps| ps.online)
        .filter_map(|ps| {
            let addr = *ps.tailscale_ips.first()?;
            let name = ps.display_name();

            let keep = match (target, filter) {
                (Some(t), _) => matches_target(ps, t),
                (None, Some(f)) => contains_ignore_case(name, f),
                (None, None) => true,
            };

            keep.then(|| SelectedPeer {
                name: name.to_string(),
                addr,
            })
        })
        .collect()
}

fn matches_target(ps: &PeerStatus, target: &str) -> bool {
    ps.host_name.eq_ignore_ascii_case(target)
        || ps.dns_name.eq_ignore_ascii_case(target)
        || ps.dns_name.trim_end_matches('.').eq_ignore_ascii_case(target)
}

pub(crate) fn contains_ignore_case(s: &str, substr: &str) -> bool {
    s.to_lowercase().contains(&substr.to_lowercase())
}
