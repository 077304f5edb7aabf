//! Unit tests for the reconciliation engine

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::reconciler::{ProvisioningPhase, Reconciler};
    use crds::{
        BMC, BareMetalHost, BareMetalHostSpec, BareMetalHostStatus, Image, NTP, NodeConfig,
        NodeConfigSpec, NodeConfigStatus, ProvisioningStatus, SecretReference,
    };
    use k8s_openapi::ByteString;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use metal_client::MockMetalClient;
    use std::collections::BTreeMap;

    const NAMESPACE: &str = "default";
    const NAME: &str = "node-0";
    const IMAGE_URL: &str = "http://images.example.com/focal-server.img";

    fn test_node_config() -> NodeConfig {
        NodeConfig {
            metadata: ObjectMeta {
                name: Some(NAME.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            spec: NodeConfigSpec {
                bmc: Some(BMC {
                    address: "ipmi://192.168.111.204".to_string(),
                    username: "admin".to_string(),
                    password: "secret".to_string(),
                    boot_mac_address: Some("52:54:00:a1:9c:ae".to_string()),
                    boot_mode: None,
                }),
                image: Some(Image {
                    url: IMAGE_URL.to_string(),
                    checksum: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
                    checksum_type: None,
                }),
                files: Vec::new(),
                cloud_init_commands: vec!["systemctl enable kubelet".to_string()],
                users: Vec::new(),
                ntp: Some(NTP {
                    servers: vec!["0.pool.ntp.org".to_string()],
                    enabled: Some(true),
                }),
                format: None,
            },
            status: None,
        }
    }

    fn reconciler_for(store: &MockMetalClient) -> Reconciler {
        Reconciler::new(Box::new(store.clone()))
    }

    fn stored_status(store: &MockMetalClient) -> NodeConfigStatus {
        store
            .node_config(NAMESPACE, NAME)
            .and_then(|config| config.status)
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_provisions_a_new_record_end_to_end() {
        let store = MockMetalClient::new();
        store.add_node_config(test_node_config());
        let reconciler = reconciler_for(&store);

        // First pass: bootstrap document stored, host created offline
        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();

        let document = store.secret(NAMESPACE, NAME).unwrap();
        let data = document.data.unwrap();
        let value = &data.get("value").unwrap().0;
        assert!(value.starts_with(b"#cloud-config"));
        let document_owners = document.metadata.owner_references.unwrap();
        assert_eq!(document_owners[0].kind, "NodeConfig");
        assert_eq!(document_owners[0].controller, Some(true));

        let credentials = store.secret(NAMESPACE, "node-0-bmc-secret").unwrap();
        assert_eq!(credentials.type_.as_deref(), Some("Opaque"));
        let credential_data = credentials.data.unwrap();
        assert_eq!(credential_data.get("username").unwrap().0, b"admin");
        assert_eq!(credential_data.get("password").unwrap().0, b"secret");
        let credential_owners = credentials.metadata.owner_references.unwrap();
        assert_eq!(credential_owners[0].kind, "BareMetalHost");

        let host = store.host(NAMESPACE, NAME).unwrap();
        assert!(!host.spec.online);
        assert_eq!(host.spec.bmc.address, "ipmi://192.168.111.204");
        assert_eq!(host.spec.bmc.credentials_name, "node-0-bmc-secret");
        assert!(host.spec.bmc.disable_certificate_verification);
        assert_eq!(host.spec.boot_mac_address.as_deref(), Some("52:54:00:a1:9c:ae"));
        assert!(host.spec.image.is_none());

        let status = stored_status(&store);
        assert!(!status.ready);
        assert_eq!(status.user_data.as_ref().unwrap().name, NAME);
        assert!(status.failure_message.is_none());

        // The host registers and becomes ready
        store.set_host_state(NAMESPACE, NAME, "ready", "OK");

        // Second pass: association completes
        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();

        let host = store.host(NAMESPACE, NAME).unwrap();
        assert!(host.spec.online);
        let image = host.spec.image.unwrap();
        assert_eq!(image.url, IMAGE_URL);
        assert_eq!(image.checksum_type, Some(crds::ChecksumType::Md5));
        assert_eq!(host.spec.user_data.unwrap().name, NAME);
        let host_owners = host.metadata.owner_references.unwrap();
        assert_eq!(host_owners[0].kind, "NodeConfig");
        assert_eq!(host_owners[0].name, NAME);

        let status = stored_status(&store);
        assert!(status.ready);
        assert!(status.failure_message.is_none());
    }

    #[tokio::test]
    async fn test_removes_record_when_host_is_not_provisionable() {
        let store = MockMetalClient::new();
        store.add_node_config(test_node_config());
        store.add_host(BareMetalHost {
            metadata: ObjectMeta {
                name: Some(NAME.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            spec: BareMetalHostSpec::default(),
            status: Some(BareMetalHostStatus {
                operational_status: "OK".to_string(),
                provisioning: ProvisioningStatus {
                    state: "error".to_string(),
                },
                powered_on: false,
            }),
        });
        let reconciler = reconciler_for(&store);

        // Deletion is the resolution, not an error
        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();

        assert!(store.node_config(NAMESPACE, NAME).is_none());
        assert!(store.host(NAMESPACE, NAME).is_none());
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent_while_host_registers() {
        let store = MockMetalClient::new();
        store.add_node_config(test_node_config());
        let reconciler = reconciler_for(&store);

        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();
        let status_after_first = stored_status(&store);
        let host_after_first = store.host(NAMESPACE, NAME).unwrap();
        assert_eq!(store.secret_count(), 2);

        // No external state change; the second pass must not mutate
        // anything or duplicate resources
        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();

        assert_eq!(stored_status(&store), status_after_first);
        let host_after_second = store.host(NAMESPACE, NAME).unwrap();
        assert_eq!(
            host_after_second.metadata.resource_version,
            host_after_first.metadata.resource_version
        );
        assert_eq!(store.secret_count(), 2);
    }

    #[tokio::test]
    async fn test_ready_is_never_cleared() {
        let store = MockMetalClient::new();
        store.add_node_config(test_node_config());
        let reconciler = reconciler_for(&store);

        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();
        store.set_host_state(NAMESPACE, NAME, "ready", "OK");
        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();
        assert!(stored_status(&store).ready);

        // A later host failure must not unwind a provisioned record
        store.set_host_state(NAMESPACE, NAME, "error", "error");
        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();

        assert!(store.node_config(NAMESPACE, NAME).is_some());
        assert!(store.host(NAMESPACE, NAME).is_some());
        assert!(stored_status(&store).ready);
    }

    #[tokio::test]
    async fn test_missing_record_is_a_no_op() {
        let store = MockMetalClient::new();
        let reconciler = reconciler_for(&store);

        reconciler
            .reconcile_node_config(NAMESPACE, "never-created")
            .await
            .unwrap();

        assert_eq!(store.secret_count(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_spec_surfaces_failure_message() {
        let store = MockMetalClient::new();
        let mut config = test_node_config();
        config.spec.image = None;
        store.add_node_config(config);
        let reconciler = reconciler_for(&store);

        let err = reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::InvalidConfig(_)));
        assert!(!err.is_retryable());
        let status = stored_status(&store);
        assert!(!status.ready);
        let message = status.failure_message.unwrap();
        assert!(message.contains("no image configuration"), "{message}");
        // No host or credential mutation was attempted
        assert!(store.host(NAMESPACE, NAME).is_none());
        assert!(store.secret(NAMESPACE, "node-0-bmc-secret").is_none());
    }

    #[tokio::test]
    async fn test_failure_message_clears_once_spec_is_fixed() {
        let store = MockMetalClient::new();
        let mut config = test_node_config();
        config.spec.image = None;
        store.add_node_config(config);
        let reconciler = reconciler_for(&store);

        let _ = reconciler.reconcile_node_config(NAMESPACE, NAME).await;
        assert!(stored_status(&store).failure_message.is_some());

        // Operator fixes the record; keep the previously persisted status
        let mut fixed = test_node_config();
        fixed.status = store.node_config(NAMESPACE, NAME).unwrap().status;
        store.add_node_config(fixed);

        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();

        let status = stored_status(&store);
        assert!(status.failure_message.is_none());
        assert!(store.host(NAMESPACE, NAME).is_some());
    }

    #[tokio::test]
    async fn test_adopts_existing_bootstrap_document() {
        let store = MockMetalClient::new();
        store.add_node_config(test_node_config());
        store.add_secret(Secret {
            metadata: ObjectMeta {
                name: Some(NAME.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "value".to_string(),
                ByteString(b"#cloud-config (pre-existing)".to_vec()),
            )])),
            ..Default::default()
        });
        let reconciler = reconciler_for(&store);

        reconciler
            .reconcile_node_config(NAMESPACE, NAME)
            .await
            .unwrap();

        // The existing secret is adopted, not overwritten or duplicated
        let status = stored_status(&store);
        assert_eq!(
            status.user_data,
            Some(SecretReference::new(
                NAME.to_string(),
                NAMESPACE.to_string()
            ))
        );
        let document = store.secret(NAMESPACE, NAME).unwrap();
        assert_eq!(
            document.data.unwrap().get("value").unwrap().0,
            b"#cloud-config (pre-existing)"
        );
        assert_eq!(store.secret_count(), 2);
    }

    #[test]
    fn test_phase_is_derived_from_observed_state() {
        let host = BareMetalHost::new(NAME, BareMetalHostSpec::default());
        let mut status = NodeConfigStatus::default();
        assert_eq!(
            ProvisioningPhase::derive(&status, None),
            ProvisioningPhase::Pending
        );

        status.user_data = Some(SecretReference::new(
            NAME.to_string(),
            NAMESPACE.to_string(),
        ));
        assert_eq!(
            ProvisioningPhase::derive(&status, None),
            ProvisioningPhase::DocumentBound
        );
        assert_eq!(
            ProvisioningPhase::derive(&status, Some(&host)),
            ProvisioningPhase::HostBinding
        );

        status.ready = true;
        assert_eq!(
            ProvisioningPhase::derive(&status, Some(&host)),
            ProvisioningPhase::Ready
        );
    }
}
