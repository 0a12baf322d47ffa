//! A simulated RDM fixture built on [`MockTransport`].
//!
//! [`SimulatedFixture`] pre-programs a mock with the answers a small
//! moving-yoke fixture would give, so the session and the test app can be
//! exercised end to end without an adapter on the bench.

use std::time::Duration;

use rdmx_core::types::{
    CommandClass, CommandKind, ParameterDescriptor, TransactionResult, Uid,
    PID_DEVICE_INFO, PID_DMX_START_ADDRESS, PID_IDENTIFY_DEVICE, PID_SUPPORTED_PARAMETERS,
};

use crate::mock_transport::{MockHandle, MockTransport};

/// Configuration of the simulated fixture.
#[derive(Debug, Clone)]
pub struct SimulatedFixture {
    pub uid: Uid,
    pub footprint: u16,
    pub start_address: u16,
    /// Round-trip time reported for every answered request.
    pub latency: Duration,
}

impl Default for SimulatedFixture {
    fn default() -> Self {
        SimulatedFixture {
            uid: Uid::from_parts(0x4845, 0x0000_1234),
            footprint: 12,
            start_address: 1,
            latency: Duration::from_micros(850),
        }
    }
}

impl SimulatedFixture {
    /// The catalog the fixture's adapter reports.
    ///
    /// Includes two mandatory parameters the fixture does not list in
    /// SUPPORTED_PARAMETERS so the cross-check has something to flag.
    pub fn catalog() -> Vec<ParameterDescriptor> {
        const GET: &str = "GET_COMMAND (0x20)";
        const GET_SET: &str = "GET/SET";
        // pid, name, command class as the adapter labels it, mandatory
        let rows: [(u16, &str, &str, bool); 16] = [
            (0x0050, "SUPPORTED_PARAMETERS", GET, true),
            (0x0051, "PARAMETER_DESCRIPTION", GET, false),
            (0x0060, "DEVICE_INFO", GET, true),
            (0x0080, "DEVICE_MODEL_DESCRIPTION", GET, false),
            (0x0081, "MANUFACTURER_LABEL", GET, false),
            (0x0082, "DEVICE_LABEL", GET_SET, false),
            (0x00C0, "SOFTWARE_VERSION_LABEL", GET, true),
            (0x00E0, "DMX_PERSONALITY", GET_SET, false),
            (0x00E1, "DMX_PERSONALITY_DESCRIPTION", GET, false),
            (0x00F0, "DMX_START_ADDRESS", GET_SET, true),
            (0x0200, "SENSOR_DEFINITION", GET, false),
            (0x0201, "SENSOR_VALUE", GET_SET, false),
            (0x0400, "DEVICE_HOURS", GET_SET, false),
            (0x1000, "IDENTIFY_DEVICE", GET_SET, true),
            (0x8060, "SERIAL_NUMBER", GET, false),
            (0x8400, "RUN_TIME", GET, false),
        ];
        rows.into_iter()
            .filter_map(|(pid, name, label, mandatory)| {
                let class = CommandClass::from_label(label)?;
                Some(ParameterDescriptor::new(pid, name, class, mandatory))
            })
            .collect()
    }

    /// The 19-byte DEVICE_INFO payload.
    pub fn device_info_payload(&self) -> Vec<u8> {
        let mut d = vec![
            0x01, 0x00, // protocol 1.0
            0x00, 0x2A, // model
            0x01, 0x02, // category: moving yoke
            0x02, 0x04, // software 2.4
            0x00, 0x11, // build 17
        ];
        d.extend_from_slice(&self.footprint.to_be_bytes());
        d.extend_from_slice(&[0x01, 0x03]); // personality 1 of 3
        d.extend_from_slice(&self.start_address.to_be_bytes());
        d.extend_from_slice(&[0x00, 0x00]); // sub-devices
        d.push(0x01); // sensors
        d
    }

    /// Build a mock transport answering as this fixture.
    ///
    /// Returns the transport and a handle for inspecting what the session
    /// sent to it.
    pub fn into_transport(self) -> (MockTransport, MockHandle) {
        let mock = MockTransport::with_identity("2.4", 0x00BC_614E);
        let handle = mock.handle();
        let lat = self.latency;
        let ack = |payload: &[u8]| TransactionResult::ack(payload, lat);

        handle.set_discovered(&[self.uid]);
        handle.set_catalog(Self::catalog());
        handle.set_echo_sets(true);

        let get = |pid: u16, result: TransactionResult| {
            handle.respond_always(CommandKind::Get, pid, result)
        };

        // Lists everything in the catalog except 0x00C0 and 0x1000. The
        // latter is always treated as supported.
        let supported: Vec<u8> = [
            0x0051u16, 0x0080, 0x0081, 0x0082, 0x00E0, 0x00E1, 0x00F0, 0x0200, 0x0201, 0x0400,
            0x8060, 0x8400,
        ]
        .iter()
        .flat_map(|pid| pid.to_be_bytes())
        .collect();
        get(PID_SUPPORTED_PARAMETERS, ack(&supported));
        get(PID_DEVICE_INFO, ack(&self.device_info_payload()));
        get(0x0051, TransactionResult::nack(0x0006, lat));
        get(0x0080, ack(b"Spot 250 Moving Head\0"));
        get(0x0081, ack(b"Heliotrope Lighting"));
        get(0x0082, ack(b"Stage Left 1"));
        get(0x00E0, ack(&[0x01, 0x03]));
        get(0x00E1, ack(b"\x01\x00\x0CStandard"));
        get(PID_DMX_START_ADDRESS, ack(&self.start_address.to_be_bytes()));
        get(
            0x0200,
            ack(b"\x00\x00\x01\x00\x00\x00\x00\x00\x7F\x00\x00\x00\x00Head Temp"),
        );
        get(0x0201, ack(&[0x00, 0x00, 0x2A, 0x00, 0x14, 0x00, 0x3C]));
        get(0x0400, ack(&1234u32.to_be_bytes()));
        get(PID_IDENTIFY_DEVICE, ack(&[0x00]));
        get(0x8060, ack(&[0x48, 0x45, 0x00, 0x00, 0x12, 0x34]));
        get(0x8400, ack(&90_061u32.to_be_bytes()));
        // 0x00C0 is left unprogrammed and times out.

        for pid in [0x0082, 0x00E0, PID_DMX_START_ADDRESS, PID_IDENTIFY_DEVICE] {
            handle.respond_code(CommandKind::Set, pid, 0, &[], lat);
        }

        (mock, handle)
    }
}
