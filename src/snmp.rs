//! SNMP interface-health client (v2c over UDP/161).
//!
//! Resolves an interface index by walking `ifName` (falling back to
//! `ifDescr`), then fetches a fixed set of counter leaves for that index.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use snmp2::{AsyncSession, Oid, Value};

use crate::config::{SNMP_OP_TIMEOUT, SNMP_PORT};

const OID_IF_NAME: &[u64] = &[1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 1];
const OID_IF_DESCR: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 2];
const OID_IF_OPER_STATUS: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 8];
const OID_IF_SPEED: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 5];
const OID_IF_IN_ERRORS: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 14];
const OID_IF_OUT_ERRORS: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 20];
const OID_IF_IN_DISCARDS: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 13];
const OID_IF_OUT_DISCARDS: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 19];

/// One `--snmp` query: which device and interface to fetch counters for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceQuery {
    pub host: String,
    pub community: String,
    pub iface: String,
}

/// Selected counters for a single interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceHealth {
    pub index: u32,
    pub name: String,
    pub oper_status: String,
    pub speed_bps: u64,
    pub in_errors: u64,
    pub out_errors: u64,
    pub in_discards: u64,
    pub out_discards: u64,
}

/// ifOperStatus integers per RFC 2863.
pub(crate) fn oper_status_label(status: i64) -> String {
    match status {
        1 => "up".to_string(),
        2 => "down".to_string(),
        3 => "testing".to_string(),
        4 => "unknown".to_string(),
        5 => "dormant".to_string(),
        6 => "notPresent".to_string(),
        7 => "lowerLayerDown".to_string(),
        other => format!("unknown({other})"),
    }
}

/// Fetch health counters for the interface named `iface` on `host`.
/// Callers bound the whole operation with their own deadline; each SNMP
/// operation additionally gets a 5 s timeout and one retry.
pub async fn get_interface_health(
    host: &str,
    community: &str,
    iface: &str,
) -> Result<InterfaceHealth> {
    if host.is_empty() || community.is_empty() || iface.is_empty() {
        bail!("host, community, and interface name are required");
    }

    let addr = format!("{host}:{SNMP_PORT}");
    let mut session = tokio::time::timeout(
        SNMP_OP_TIMEOUT,
        AsyncSession::new_v2c(&addr, community.as_bytes(), 0),
    )
    .await
    .map_err(|_| anyhow!("snmp connect to {addr} timed out"))?
    .with_context(|| format!("snmp connect to {addr}"))?;

    let (index, resolved_name) = find_interface_index(&mut session, iface).await?;

    let mut health = InterfaceHealth {
        index,
        name: resolved_name,
        ..Default::default()
    };

    let status = get_value(&mut session, OID_IF_OPER_STATUS, index)
        .await
        .context("fetch ifOperStatus")?;
    health.oper_status = oper_status_label(to_i64(&status).context("parse ifOperStatus")?);

    let speed = get_value(&mut session, OID_IF_SPEED, index)
        .await
        .context("fetch ifSpeed")?;
    health.speed_bps = to_u64(&speed).context("parse ifSpeed")?;

    let in_errors = get_value(&mut session, OID_IF_IN_ERRORS, index)
        .await
        .context("fetch ifInErrors")?;
    health.in_errors = to_u64(&in_errors).context("parse ifInErrors")?;

    let out_errors = get_value(&mut session, OID_IF_OUT_ERRORS, index)
        .await
        .context("fetch ifOutErrors")?;
    health.out_errors = to_u64(&out_errors).context("parse ifOutErrors")?;

    let in_discards = get_value(&mut session, OID_IF_IN_DISCARDS, index)
        .await
        .context("fetch ifInDiscards")?;
    health.in_discards = to_u64(&in_discards).context("parse ifInDiscards")?;

    let out_discards = get_value(&mut session, OID_IF_OUT_DISCARDS, index)
        .await
        .context("fetch ifOutDiscards")?;
    health.out_discards = to_u64(&out_discards).context("parse ifOutDiscards")?;

    Ok(health)
}

/// Case-insensitive exact match on `ifName`, falling back to `ifDescr`.
async fn find_interface_index(
    session: &mut AsyncSession,
    iface: &str,
) -> Result<(u32, String)> {
    if let Some(found) = walk_for_interface(session, OID_IF_NAME, iface).await? {
        return Ok(found);
    }
    if let Some(found) = walk_for_interface(session, OID_IF_DESCR, iface).await? {
        return Ok(found);
    }
    bail!("interface {iface:?} not found via SNMP")
}

/// Walk the subtree under `base` with getnext until the returned OID
/// leaves the subtree, looking for a value equal to `iface`.
async fn walk_for_interface(
    session: &mut AsyncSession,
    base: &[u64],
    iface: &str,
) -> Result<Option<(u32, String)>> {
    let base_prefix = format!("{}.", dotted(base));
    let mut current: Vec<u64> = base.to_vec();

    loop {
        let Some((oid_text, value)) = getnext_owned(session, &current).await? else {
            return Ok(None);
        };

        if !oid_text.starts_with(&base_prefix) {
            return Ok(None);
        }
        let suffix = &oid_text[base_prefix.len()..];
        let next: Vec<u64> = oid_text
            .split('.')
            .filter_map(|part| part.parse::<u64>().ok())
            .collect();
        if next.is_empty() || next == current {
            return Ok(None);
        }

        if let OwnedValue::Text(name) = value {
            let trimmed = name.trim().to_string();
            if trimmed.eq_ignore_ascii_case(iface) {
                let index: u32 = suffix
                    .parse()
                    .with_context(|| format!("invalid interface index {suffix:?}"))?;
                return Ok(Some((index, trimmed)));
            }
        }

        current = next;
    }
}

/// GET `base.index` and return the single varbind's value as owned data.
async fn get_value(session: &mut AsyncSession, base: &[u64], index: u32) -> Result<OwnedValue> {
    let mut leaf: Vec<u64> = base.to_vec();
    leaf.push(u64::from(index));

    let mut values = get_owned(session, &leaf).await?;
    if values.len() != 1 {
        bail!(
            "unexpected SNMP response length for {}: got {}, want 1",
            dotted(&leaf),
            values.len()
        );
    }
    Ok(values.remove(0))
}

/// One GET with the per-op timeout and a single retry. Values are copied
/// out of the response buffer before the PDU is dropped.
async fn get_owned(session: &mut AsyncSession, parts: &[u64]) -> Result<Vec<OwnedValue>> {
    let oid = Oid::from(parts).map_err(|_| anyhow!("invalid OID {}", dotted(parts)))?;
    for attempt in 0..2 {
        match tokio::time::timeout(SNMP_OP_TIMEOUT, session.get(&oid)).await {
            Ok(Ok(mut pdu)) => {
                let mut values = Vec::new();
                while let Some((_, value)) = pdu.varbinds.next() {
                    values.push(OwnedValue::from(&value));
                }
                return Ok(values);
            }
            Ok(Err(e)) => return Err(anyhow!("snmp get: {e:?}")),
            Err(_) if attempt == 0 => {
                tracing::debug!("snmp get timed out, retrying once");
            }
            Err(_) => return Err(anyhow!("snmp get timed out")),
        }
    }
    unreachable!("retry loop always returns")
}

/// One GETNEXT with the per-op timeout and a single retry, returning the
/// first varbind as (dotted OID, value).
async fn getnext_owned(
    session: &mut AsyncSession,
    parts: &[u64],
) -> Result<Option<(String, OwnedValue)>> {
    let oid = Oid::from(parts).map_err(|_| anyhow!("invalid OID {}", dotted(parts)))?;
    for attempt in 0..2 {
        match tokio::time::timeout(SNMP_OP_TIMEOUT, session.getnext(&oid)).await {
            Ok(Ok(mut pdu)) => {
                return Ok(pdu
                    .varbinds
                    .next()
                    .map(|(roid, value)| (roid.to_string(), OwnedValue::from(&value))));
            }
            Ok(Err(e)) => return Err(anyhow!("snmp getnext: {e:?}")),
            Err(_) if attempt == 0 => {
                tracing::debug!("snmp getnext timed out, retrying once");
            }
            Err(_) => return Err(anyhow!("snmp getnext timed out")),
        }
    }
    unreachable!("retry loop always returns")
}

fn dotted(parts: &[u64]) -> String {
    parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Owned snapshot of an SNMP value, decoupled from the response buffer.
#[derive(Debug, Clone)]
pub(crate) enum OwnedValue {
    Integer(i64),
    Unsigned(u64),
    Text(String),
    Other,
}

impl From<&Value<'_>> for OwnedValue {
    fn from(value: &Value<'_>) -> Self {
        match value {
            Value::Integer(v) => OwnedValue::Integer(*v),
            Value::Counter32(v) => OwnedValue::Unsigned(u64::from(*v)),
            Value::Unsigned32(v) => OwnedValue::Unsigned(u64::from(*v)),
            Value::Counter64(v) => OwnedValue::Unsigned(*v),
            Value::Timeticks(v) => OwnedValue::Unsigned(u64::from(*v)),
            Value::OctetString(bytes) => {
                OwnedValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
            _ => OwnedValue::Other,
        }
    }
}

/// Any integer representation is accepted for counters; negative signed
/// values are rejected.
pub(crate) fn to_u64(value: &OwnedValue) -> Result<u64> {
    match value {
        OwnedValue::Unsigned(v) => Ok(*v),
        OwnedValue::Integer(v) if *v >= 0 => Ok(*v as u64),
        OwnedValue::Integer(v) => bail!("negative value {v}"),
        other => bail!("unsupported type {other:?} for integer conversion"),
    }
}

pub(crate) fn to_i64(value: &OwnedValue) -> Result<i64> {
    match value {
        OwnedValue::Integer(v) => Ok(*v),
        OwnedValue::Unsigned(v) if *v <= i64::MAX as u64 => Ok(*v as i64),
        OwnedValue::Unsigned(v) => bail!("value {v} overflows i64"),
        other => bail!("unsupported type {other:?} for integer conversion"),
    }
}
