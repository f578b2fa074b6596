// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 p2sdr developers

//! Discovery reply frame.
//!
//! A 60-byte reply identifying this server, sent back to the source address
//! of a discovery request on the command port. Only 60-byte requests are
//! ever examined there, which filters protocol-1 discovery from other
//! hardware generations.

use crate::config::{
    DISCOVERY_REPLY_SIZE, PROTOCOL_VERSION, REPORTED_DDC_COUNT, REPORTED_FIRMWARE_VERSION,
};

/// Static identity carried in every discovery reply.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryIdentity {
    /// Host MAC address (eth0), bytes 5-10 of the reply.
    pub mac: [u8; 6],
    /// Board id byte: 10 = Saturn, 5 = Orion Mk 2.
    pub board_id: u8,
}

/// Build the 60-byte discovery reply. The state byte is 2 when idle and 3
/// when a session is active.
#[must_use]
pub fn build_reply(identity: &DiscoveryIdentity, active: bool) -> [u8; DISCOVERY_REPLY_SIZE] {
    let mut reply = [0u8; DISCOVERY_REPLY_SIZE];
    // bytes 0-3: sequence, always zero
    reply[4] = if active { 3 } else { 2 };
    reply[5..11].copy_from_slice(&identity.mac);
    reply[11] = identity.board_id;
    reply[12] = PROTOCOL_VERSION;
    reply[13] = REPORTED_FIRMWARE_VERSION;
    // bytes 14-19: legacy Mercury/Metis/Penny versions, zero
    reply[20] = REPORTED_DDC_COUNT;
    reply[21] = 1; // frequency sent as phase word
    reply[22] = 0; // big-endian data
    reply
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BOARD_ID_SATURN;

    #[test]
    fn reply_shape() {
        let identity = DiscoveryIdentity {
            mac: [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01],
            board_id: BOARD_ID_SATURN,
        };
        let reply = build_reply(&identity, false);
        assert_eq!(reply.len(), 60);
        assert_eq!(&reply[0..4], &[0, 0, 0, 0]);
        assert_eq!(reply[4], 2);
        assert_eq!(&reply[5..11], &identity.mac);
        assert_eq!(reply[11], 10);
        assert_eq!(reply[12], 39);
        assert_eq!(reply[13], 20);
        assert_eq!(&reply[14..20], &[0; 6]);
        assert_eq!(reply[20], 4);
        assert_eq!(reply[21], 1);
        assert_eq!(reply[22], 0);
        assert!(reply[23..].iter().all(|&b| b == 0));

        let active = build_reply(&identity, true);
        assert_eq!(active[4], 3);
    }
}
