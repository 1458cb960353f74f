//! Bulk endpoint discovery on the session interface.

use thiserror::Error;

use crate::transport::{EndpointDirection, InterfaceShape, TransferKind};

/// Resolved bulk endpoint pair for a session. Immutable after open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkEndpoints {
    pub input: u8,
    pub output: u8,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no bulk {0} endpoint on the first interface")]
    Missing(EndpointDirection),

    #[error("more than one bulk {0} endpoint on the first interface")]
    Duplicate(EndpointDirection),
}

/// Classify the endpoint descriptors of the first config / interface / alt
/// setting into exactly one bulk-in and one bulk-out address.
///
/// Non-bulk endpoints are ignored. Zero or duplicate bulk endpoints of
/// either direction is an error; a device with such a shape never becomes a
/// session.
pub fn resolve_bulk_endpoints(shape: &InterfaceShape) -> Result<BulkEndpoints, ResolveError> {
    let mut input = None;
    let mut output = None;

    for ep in &shape.endpoints {
        if ep.kind != TransferKind::Bulk {
            continue;
        }
        let slot = match ep.direction {
            EndpointDirection::In => &mut input,
            EndpointDirection::Out => &mut output,
        };
        if slot.is_some() {
            return Err(ResolveError::Duplicate(ep.direction));
        }
        *slot = Some(ep.address);
    }

    Ok(BulkEndpoints {
        input: input.ok_or(ResolveError::Missing(EndpointDirection::In))?,
        output: output.ok_or(ResolveError::Missing(EndpointDirection::Out))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EndpointInfo;

    fn ep(address: u8, kind: TransferKind, direction: EndpointDirection) -> EndpointInfo {
        EndpointInfo {
            address,
            kind,
            direction,
        }
    }

    fn shape(endpoints: Vec<EndpointInfo>) -> InterfaceShape {
        InterfaceShape {
            interface_number: 0,
            endpoints,
        }
    }

    #[test]
    fn test_resolves_bulk_pair() {
        let shape = shape(vec![
            ep(0x81, TransferKind::Bulk, EndpointDirection::In),
            ep(0x01, TransferKind::Bulk, EndpointDirection::Out),
        ]);
        let pair = resolve_bulk_endpoints(&shape).unwrap();
        assert_eq!(pair.input, 0x81);
        assert_eq!(pair.output, 0x01);
    }

    #[test]
    fn test_ignores_non_bulk_endpoints() {
        let shape = shape(vec![
            ep(0x82, TransferKind::Interrupt, EndpointDirection::In),
            ep(0x81, TransferKind::Bulk, EndpointDirection::In),
            ep(0x01, TransferKind::Bulk, EndpointDirection::Out),
            ep(0x02, TransferKind::Interrupt, EndpointDirection::Out),
        ]);
        let pair = resolve_bulk_endpoints(&shape).unwrap();
        assert_eq!(pair.input, 0x81);
        assert_eq!(pair.output, 0x01);
    }

    #[test]
    fn test_missing_in_endpoint() {
        let shape = shape(vec![ep(0x01, TransferKind::Bulk, EndpointDirection::Out)]);
        assert_eq!(
            resolve_bulk_endpoints(&shape),
            Err(ResolveError::Missing(EndpointDirection::In))
        );
    }

    #[test]
    fn test_missing_out_endpoint() {
        let shape = shape(vec![ep(0x81, TransferKind::Bulk, EndpointDirection::In)]);
        assert_eq!(
            resolve_bulk_endpoints(&shape),
            Err(ResolveError::Missing(EndpointDirection::Out))
        );
    }

    #[test]
    fn test_duplicate_bulk_in_rejected() {
        let shape = shape(vec![
            ep(0x81, TransferKind::Bulk, EndpointDirection::In),
            ep(0x82, TransferKind::Bulk, EndpointDirection::In),
            ep(0x01, TransferKind::Bulk, EndpointDirection::Out),
        ]);
        assert_eq!(
            resolve_bulk_endpoints(&shape),
            Err(ResolveError::Duplicate(EndpointDirection::In))
        );
    }
}
