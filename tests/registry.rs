// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for a bridge built from a configuration document.

use std::sync::Arc;
use std::time::Duration;

use pushbot_bridge::adapter::{AdapterCall, SimulatedAdapter, SimulatedPeripheral};
use pushbot_bridge::config::BridgeConfig;
use pushbot_bridge::error::ConfigError;
use pushbot_bridge::event::BridgeEvent;
use pushbot_bridge::manager::{DeviceRegistry, LinkPhase};
use pushbot_bridge::types::MacAddress;
use tokio::time::sleep;
use uuid::Uuid;

const CONFIG: &str = r#"{
    "devices": [
        {
            "name": "Gate",
            "mac_address": "aa-bb-cc-dd-ee-ff",
            "service_uuid": "cba20d00-224d-11e6-9fb8-0002a5d5c51b",
            "write_uuid": "cba20002-224d-11e6-9fb8-0002a5d5c51b",
            "push_packet_hex": "0102030f"
        },
        {
            "name": "Broken",
            "mac_address": "11:22:33:44:55:66",
            "service_uuid": "cba20d00-224d-11e6-9fb8-0002a5d5c51b",
            "write_uuid": "cba20002-224d-11e6-9fb8-0002a5d5c51b",
            "push_packet_hex": "0g"
        },
        {
            "name": "Garage",
            "mac_address": "AABBCCDDEE00",
            "service_uuid": "cba20d00-224d-11e6-9fb8-0002a5d5c51b",
            "write_uuid": "cba20002-224d-11e6-9fb8-0002a5d5c51b",
            "notify_uuid": "cba20003-224d-11e6-9fb8-0002a5d5c51b",
            "push_packet_hex": "570100"
        }
    ],
    "timing": {
        "reconnect_delay_ms": 2000,
        "scan_window_ms": 1000
    }
}"#;

fn uuid(value: &str) -> Uuid {
    Uuid::parse_str(value).unwrap()
}

fn peripheral(address: &str, with_notify: bool) -> SimulatedPeripheral {
    let mut characteristics = vec![uuid("cba20002-224d-11e6-9fb8-0002a5d5c51b")];
    if with_notify {
        characteristics.push(uuid("cba20003-224d-11e6-9fb8-0002a5d5c51b"));
    }
    SimulatedPeripheral::new(address.parse().unwrap()).with_service(
        uuid("cba20d00-224d-11e6-9fb8-0002a5d5c51b"),
        characteristics,
    )
}

fn bridge() -> (DeviceRegistry<SimulatedAdapter>, Arc<SimulatedAdapter>) {
    let adapter = Arc::new(SimulatedAdapter::new());
    adapter.add_peripheral(peripheral("AA:BB:CC:DD:EE:FF", false));
    adapter.add_peripheral(peripheral("AA:BB:CC:DD:EE:00", true));

    let config = BridgeConfig::from_json_str(CONFIG).unwrap();
    (
        DeviceRegistry::from_config(&config, Arc::clone(&adapter)),
        adapter,
    )
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration {
    use super::*;

    #[test]
    fn invalid_entry_is_rejected_others_kept() {
        let (registry, _) = bridge();

        assert_eq!(registry.len(), 2);
        assert!(matches!(
            registry.rejected(),
            [ConfigError::InvalidDevice { index: 1, name, .. }] if name == "Broken"
        ));
    }

    #[test]
    fn timing_overrides_reach_controllers() {
        let (registry, _) = bridge();

        for controller in registry.controllers() {
            assert_eq!(controller.timing().reconnect_delay, Duration::from_secs(2));
            assert_eq!(controller.timing().scan_window, Duration::from_secs(1));
            assert_eq!(controller.timing().auto_off_delay, Duration::from_millis(1500));
        }
    }

    #[test]
    fn addresses_are_normalized() {
        let (registry, _) = bridge();
        let expected: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();

        let gate = registry.find_by_address("aabbccddeeff").unwrap();
        assert_eq!(gate.config().address, expected);
        assert_eq!(gate.config().address.key(), "aabbccddeeff");
        assert!(registry.find_by_address("AA_BB_CC_DD_EE_00").is_some());
    }

    #[test]
    fn accessories_follow_configuration_order() {
        let (registry, _) = bridge();

        let serials: Vec<String> = registry
            .accessories()
            .iter()
            .map(|a| a.info().serial.clone())
            .collect();
        assert_eq!(serials, ["aabbccddeeff", "aabbccddee00"]);
    }
}

// ============================================================================
// Running bridge
// ============================================================================

mod running {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn every_device_connects() {
        let (registry, adapter) = bridge();

        registry.spawn_discovery();
        sleep(Duration::from_secs(5)).await;

        for controller in registry.controllers() {
            assert_eq!(controller.phase(), LinkPhase::Ready);
        }
        assert!(registry.controllers()[1].status().heartbeat_active);
        assert!(!registry.controllers()[0].status().heartbeat_active);
        assert_eq!(adapter.count(|c| matches!(c, AdapterCall::Connect(_))), 2);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn switch_push_is_visible_on_event_bus() {
        let (registry, adapter) = bridge();
        let mut events = registry.subscribe();
        registry.spawn_discovery();
        sleep(Duration::from_secs(5)).await;

        let gate = registry.accessories().remove(0);
        let id = gate.controller().id();
        gate.set(true);
        sleep(Duration::from_secs(3)).await;

        let gate_events: Vec<BridgeEvent> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| e.device_id() == id)
            .collect();
        assert_eq!(
            gate_events,
            vec![
                BridgeEvent::device_added(id, "Gate"),
                BridgeEvent::connected(id),
                BridgeEvent::switch_changed(id, true),
                BridgeEvent::push_completed(id, true, 1),
                BridgeEvent::switch_changed(id, false),
            ]
        );
        assert_eq!(adapter.writes(), vec![vec![0x01, 0x02, 0x03, 0x0f]]);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn devices_fail_independently() {
        let (registry, adapter) = bridge();
        registry.spawn_discovery();
        sleep(Duration::from_secs(4)).await;

        adapter.set_in_range(&"AA:BB:CC:DD:EE:FF".parse().unwrap(), false);
        sleep(Duration::from_millis(10)).await;

        assert_eq!(registry.controllers()[0].phase(), LinkPhase::Idle);
        assert_eq!(registry.controllers()[1].phase(), LinkPhase::Ready);

        let garage = &registry.controllers()[1];
        assert!(garage.activate(true).await.is_delivered());

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_heartbeats() {
        let (registry, adapter) = bridge();
        registry.spawn_discovery();
        sleep(Duration::from_secs(5)).await;

        registry.shutdown().await;
        adapter.clear_calls();
        sleep(Duration::from_secs(60)).await;

        assert!(registry.is_shut_down());
        assert!(adapter.calls().is_empty());
    }
}
