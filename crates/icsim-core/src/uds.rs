//! UDS protocol handling for the simulated cluster
//!
//! Only SecurityAccess (0x27) with the seed and key sub-functions is modeled.

/// UDS Service IDs
pub mod service_id {
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// SecurityAccess sub-functions
pub mod security_sub_function {
    pub const REQUEST_SEED: u8 = 0x01;
    pub const SEND_KEY: u8 = 0x02;
}

/// UDS Negative Response Codes
pub mod nrc {
    pub const INVALID_KEY: u8 = 0x35;
}

/// Positive response SID = request SID + 0x40
pub const fn positive_sid(service_id: u8) -> u8 {
    service_id + 0x40
}

/// A decoded diagnostic request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdsRequest {
    pub service: u8,
    pub subfunction: u8,
    /// Key byte, present only when the payload carried a third byte
    pub key: Option<u8>,
}

impl UdsRequest {
    pub fn request_seed() -> Self {
        Self {
            service: service_id::SECURITY_ACCESS,
            subfunction: security_sub_function::REQUEST_SEED,
            key: None,
        }
    }

    pub fn send_key(key: u8) -> Self {
        Self {
            service: service_id::SECURITY_ACCESS,
            subfunction: security_sub_function::SEND_KEY,
            key: Some(key),
        }
    }

    /// Wire payload for this request
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = vec![self.service, self.subfunction];
        if let Some(key) = self.key {
            payload.push(key);
        }
        payload
    }
}

/// A three-byte SecurityAccess response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdsResponse {
    /// `{0x67, subfunction, value}`; value is the seed for 0x01 and 0x00 for 0x02
    Positive { subfunction: u8, value: u8 },
    /// `{0x7F, service, nrc}`
    Negative { service: u8, nrc: u8 },
}

impl UdsResponse {
    pub fn seed(seed: u8) -> Self {
        Self::Positive {
            subfunction: security_sub_function::REQUEST_SEED,
            value: seed,
        }
    }

    pub fn key_accepted() -> Self {
        Self::Positive {
            subfunction: security_sub_function::SEND_KEY,
            value: 0x00,
        }
    }

    pub fn invalid_key() -> Self {
        Self::Negative {
            service: service_id::SECURITY_ACCESS,
            nrc: nrc::INVALID_KEY,
        }
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            Self::Positive { subfunction, value } => [
                positive_sid(service_id::SECURITY_ACCESS),
                subfunction,
                value,
            ],
            Self::Negative { service, nrc } => [service_id::NEGATIVE_RESPONSE, service, nrc],
        }
    }

    /// Parse a SecurityAccess response payload; anything else is `None`
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        match payload {
            [sid, subfunction, value, ..] if *sid == positive_sid(service_id::SECURITY_ACCESS) => {
                Some(Self::Positive {
                    subfunction: *subfunction,
                    value: *value,
                })
            }
            [service_id::NEGATIVE_RESPONSE, service, nrc, ..]
                if *service == service_id::SECURITY_ACCESS =>
            {
                Some(Self::Negative {
                    service: *service,
                    nrc: *nrc,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_wire_format() {
        assert_eq!(UdsResponse::seed(0x42).to_bytes(), [0x67, 0x01, 0x42]);
        assert_eq!(UdsResponse::key_accepted().to_bytes(), [0x67, 0x02, 0x00]);
        assert_eq!(UdsResponse::invalid_key().to_bytes(), [0x7F, 0x27, 0x35]);
    }

    #[test]
    fn test_parse_response_ignores_other_services() {
        assert_eq!(UdsResponse::from_bytes(&[0x62, 0xF1, 0x90]), None);
        assert_eq!(UdsResponse::from_bytes(&[0x7F, 0x22, 0x31]), None);
        assert_eq!(UdsResponse::from_bytes(&[0x67, 0x01]), None);
        assert_eq!(
            UdsResponse::from_bytes(&[0x7F, 0x27, 0x35]),
            Some(UdsResponse::invalid_key())
        );
    }

    #[test]
    fn test_request_payload() {
        assert_eq!(UdsRequest::request_seed().to_bytes(), vec![0x27, 0x01]);
        assert_eq!(UdsRequest::send_key(0xF0).to_bytes(), vec![0x27, 0x02, 0xF0]);
    }
}
