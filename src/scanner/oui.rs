//! MAC vendor attribution from the embedded OUI database.

use std::sync::OnceLock;

use mac_oui::Oui;

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| match Oui::default() {
            Ok(db) => Some(db),
            Err(e) => {
                tracing::warn!("embedded OUI database unavailable: {e}");
                None
            }
        })
        .as_ref()
}

/// Vendor name for a normalized MAC, or None when the prefix is unknown.
pub fn vendor_for_mac(mac: &str) -> Option<String> {
    let db = oui_db()?;
    match db.lookup_by_mac(mac) {
        Ok(Some(entry)) => {
            let name = entry.company_name.trim();
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        }
        _ => None,
    }
}
