//! Frame codec
//!
//! Pure functions that turn a CAN payload into telemetry values or a UDS
//! request. Payloads too short for the configured offset decode to `None`;
//! bus noise is expected and never an error.

use crate::layout::{Channel, FieldLayout, SpeedModel};
use crate::uds::{service_id, UdsRequest};

/// Classic CAN maximum payload
pub const CAN_MAX_DLEN: usize = 8;
/// CAN-FD maximum payload
pub const CANFD_MAX_DLEN: usize = 64;

/// Per-door lock bits (door 1 = bit 0 .. door 4 = bit 3)
const DOOR_LOCK_MASKS: [u8; 4] = [0x01, 0x02, 0x04, 0x08];
const LEFT_SIGNAL: u8 = 0x01;
const RIGHT_SIGNAL: u8 = 0x02;

const KMH_TO_MPH: f64 = 0.6213751;

/// A decoded telemetry value, ready to apply to the vehicle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryUpdate {
    Doors([bool; 4]),
    Signals([bool; 2]),
    Speed(u32),
}

/// Door `i` is locked iff bit `i` of the byte at `offset` is set
pub fn decode_door(payload: &[u8], offset: usize) -> Option<[bool; 4]> {
    let byte = *payload.get(offset)?;
    Some(DOOR_LOCK_MASKS.map(|mask| byte & mask != 0))
}

/// `[left, right]`; both may be on at once
pub fn decode_signal(payload: &[u8], offset: usize) -> Option<[bool; 2]> {
    let byte = *payload.get(offset)?;
    Some([byte & LEFT_SIGNAL != 0, byte & RIGHT_SIGNAL != 0])
}

/// Speed from the two bytes at `[offset, offset + 1]`
pub fn decode_speed(payload: &[u8], offset: usize, model: SpeedModel) -> Option<u32> {
    let b0 = *payload.get(offset)?;
    let b1 = *payload.get(offset.checked_add(1)?)?;

    let speed = match model {
        SpeedModel::Metric => {
            let kmh = u16::from_be_bytes([b0, b1]) / 100;
            (f64::from(kmh) * KMH_TO_MPH) as u32
        }
        SpeedModel::Bmw => {
            // Little-endian with a 208 bias on the high byte
            let raw = ((i32::from(b1) - 208) * 256 + i32::from(b0)) / 16;
            raw.max(0) as u32
        }
    };
    Some(speed)
}

/// Decode a SecurityAccess request; other services are `None`
pub fn decode_uds_request(payload: &[u8]) -> Option<UdsRequest> {
    match payload {
        [service, subfunction, rest @ ..] if *service == service_id::SECURITY_ACCESS => {
            Some(UdsRequest {
                service: *service,
                subfunction: *subfunction,
                key: rest.first().copied(),
            })
        }
        _ => None,
    }
}

/// Decode the telemetry carried for `channel` under `layout`.
///
/// The diagnostic channel carries no telemetry and always yields `None`.
pub fn decode_telemetry(
    channel: Channel,
    payload: &[u8],
    layout: &FieldLayout,
    speed_model: SpeedModel,
) -> Option<TelemetryUpdate> {
    match channel {
        Channel::Door => decode_door(payload, layout.door.offset).map(TelemetryUpdate::Doors),
        Channel::Signal => {
            decode_signal(payload, layout.signal.offset).map(TelemetryUpdate::Signals)
        }
        Channel::Speed => {
            decode_speed(payload, layout.speed.offset, speed_model).map(TelemetryUpdate::Speed)
        }
        Channel::Diagnostic => None,
    }
}
