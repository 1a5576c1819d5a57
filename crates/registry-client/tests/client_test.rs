//! End-to-end tests: client against a live service over in-memory storage

use axum::{routing::get, Router};
use std::sync::Arc;
use vehicle_registry_client::RegistryClient;
use vehicle_registry_common::{
    Address, Error, RegistryEvent, Role, RoleConfig, VehicleRegistration,
};
use vehicle_registry_core::Transaction;
use vehicle_registry_service::{create_router, handlers, AppState, Ledger, MemoryStorage};

const VIN: &str = "1HGBH41JXMN109186";
const OTHER_VIN: &str = "2T1BURHE0JC123456";

fn roles() -> RoleConfig {
    RoleConfig::new(
        Address::new([0xaa; 20]),
        Address::new([0xbb; 20]),
        Address::new([0xcc; 20]),
    )
}

fn civic(vin: &str) -> VehicleRegistration {
    VehicleRegistration::new(vin, "Red", "Honda Civic", "Honda", "John Doe", "DL12345678")
}

fn register_tx(vin: &str) -> Transaction {
    Transaction::RegisterVehicle(civic(vin))
}

async fn app_state() -> AppState {
    let ledger = Ledger::open(roles(), Box::new(MemoryStorage::new()))
        .await
        .unwrap();
    AppState::new(ledger)
}

/// Serve `router` on an ephemeral port, returning its base URL
async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn start_service() -> String {
    spawn(create_router(app_state().await)).await
}

#[tokio::test]
async fn test_full_lifecycle() {
    let url = start_service().await;
    let dealer = RegistryClient::new(&url).with_caller(roles().dealership);
    let service = RegistryClient::new(&url).with_caller(roles().service_centre);
    let company = RegistryClient::new(&url).with_caller(roles().company);

    assert!(dealer.health_check().await.unwrap());

    let event = dealer.register_vehicle(&civic(VIN)).await.unwrap();
    assert_eq!(event.sequence, 0);
    assert_eq!(
        event.event,
        RegistryEvent::VehicleRegistered {
            vin: VIN.to_string(),
            owner_name: "John Doe".to_string(),
        }
    );

    let event = service.update_mileage(VIN, 5000).await.unwrap();
    assert_eq!(event.caller, roles().service_centre);

    let details = dealer.vehicle_details(VIN).await.unwrap().unwrap();
    assert_eq!(details.distance_run, 5000);
    assert_eq!(details.last_service_date, event.timestamp);

    let event = company.verify_vehicle(VIN).await.unwrap();
    assert_eq!(
        event.event,
        RegistryEvent::VehicleVerified {
            vin: VIN.to_string(),
            verifier: roles().company,
        }
    );

    let events = dealer.events(0, 10).await.unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(dealer.events(2, 10).await.unwrap()[0].sequence, 2);
}

#[tokio::test]
async fn test_rejections_map_to_registry_errors() {
    let url = start_service().await;
    let dealer = RegistryClient::new(&url).with_caller(roles().dealership);
    let service = RegistryClient::new(&url).with_caller(roles().service_centre);

    let err = service.register_vehicle(&civic(VIN)).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(Role::Dealership)));
    assert_eq!(err.user_message(), "You are not authorized as a dealership");

    dealer.register_vehicle(&civic(VIN)).await.unwrap();
    assert!(matches!(
        dealer.register_vehicle(&civic(VIN)).await.unwrap_err(),
        Error::DuplicateVehicle
    ));

    let err = dealer.update_mileage(VIN, 10).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(Role::ServiceCentre)));

    service.update_mileage(VIN, 5000).await.unwrap();
    let err = service.update_mileage(VIN, 5000).await.unwrap_err();
    assert!(matches!(err, Error::MileageNotIncreasing { current: 5000 }));

    assert!(matches!(
        service.update_mileage(OTHER_VIN, 10).await.unwrap_err(),
        Error::VehicleNotRegistered
    ));

    assert!(matches!(
        dealer.vehicle_at_index(7).await.unwrap_err(),
        Error::IndexOutOfBounds { index: 7, len: 1 }
    ));
}

#[tokio::test]
async fn test_vin_format_checked_before_submit() {
    let url = start_service().await;
    let dealer = RegistryClient::new(&url).with_caller(roles().dealership);

    let err = dealer.register_vehicle(&civic("VIN001")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidVinFormat(6)));
    assert_eq!(dealer.total_vehicles().await.unwrap(), 0);

    // The registry itself accepts any non-empty VIN
    let lenient = RegistryClient::new(&url)
        .with_caller(roles().dealership)
        .with_vin_format_check(false);
    lenient.register_vehicle(&civic("VIN001")).await.unwrap();
    assert!(lenient.is_vehicle_registered("VIN001").await.unwrap());
}

#[tokio::test]
async fn test_writes_require_caller() {
    let url = start_service().await;
    let anonymous = RegistryClient::new(&url);

    assert!(matches!(
        anonymous.register_vehicle(&civic(VIN)).await.unwrap_err(),
        Error::InvalidAddress(_)
    ));
    assert_eq!(anonymous.total_vehicles().await.unwrap(), 0);
}

#[tokio::test]
async fn test_reads_and_enumeration() {
    let url = start_service().await;
    let dealer = RegistryClient::new(&url).with_caller(roles().dealership);

    assert!(dealer.vehicle_details(VIN).await.unwrap().is_none());
    assert!(dealer.vehicle_with_documents(VIN).await.unwrap().is_none());
    assert!(!dealer.is_vehicle_registered(VIN).await.unwrap());

    dealer
        .register_vehicle(&civic(VIN).with_documents("QmImage", "QmDocs", "QmMeta"))
        .await
        .unwrap();
    dealer.register_vehicle(&civic(OTHER_VIN)).await.unwrap();

    let with_docs = dealer.vehicle_with_documents(VIN).await.unwrap().unwrap();
    assert_eq!(with_docs.image_ipfs_hash, "QmImage");
    assert_eq!(with_docs.metadata_ipfs_hash, "QmMeta");
    assert_eq!(with_docs.last_service_label(), "Never serviced");

    let legacy = dealer.vehicle_with_documents(OTHER_VIN).await.unwrap().unwrap();
    assert!(legacy.documents_ipfs_hash.is_empty());

    assert_eq!(dealer.total_vehicles().await.unwrap(), 2);
    assert_eq!(dealer.all_vehicle_vins().await.unwrap(), [VIN, OTHER_VIN]);
    assert_eq!(dealer.vehicle_at_index(1).await.unwrap(), OTHER_VIN);
}

#[tokio::test]
async fn test_vins_with_reserved_characters() {
    let url = start_service().await;
    let dealer = RegistryClient::new(&url)
        .with_caller(roles().dealership)
        .with_vin_format_check(false);
    let service = RegistryClient::new(&url).with_caller(roles().service_centre);

    for vin in ["count", "A/B", "X?Y#Z", "with space"] {
        dealer.register_vehicle(&civic(vin)).await.unwrap();
        assert!(dealer.is_vehicle_registered(vin).await.unwrap());

        let details = dealer.vehicle_details(vin).await.unwrap().unwrap();
        assert_eq!(details.vin, vin);

        let with_docs = dealer.vehicle_with_documents(vin).await.unwrap().unwrap();
        assert_eq!(with_docs.vin, vin);

        service.update_mileage(vin, 42).await.unwrap();
    }

    assert_eq!(dealer.total_vehicles().await.unwrap(), 4);
    assert_eq!(dealer.vehicle_at_index(1).await.unwrap(), "A/B");
    assert!(!dealer.is_vehicle_registered("A").await.unwrap());
}

#[tokio::test]
async fn test_roles() {
    let url = start_service().await;
    let client = RegistryClient::new(&url);

    assert_eq!(client.roles().await.unwrap(), roles());
    assert_eq!(
        client.role_of(&roles().service_centre).await.unwrap(),
        Some(Role::ServiceCentre)
    );
    assert_eq!(client.role_of(&Address::new([0x01; 20])).await.unwrap(), None);
}

#[tokio::test]
async fn test_documents_fallback_on_legacy_service() {
    let state = app_state().await;
    {
        let mut ledger = state.ledger.lock().await;
        ledger
            .submit(roles().dealership, register_tx(VIN))
            .await
            .unwrap();
    }

    // A deployment that predates the documents route
    let router = Router::new()
        .route("/api/vehicles/{vin}", get(handlers::vehicle_details_handler))
        .with_state(Arc::new(state));
    let url = spawn(router).await;
    let client = RegistryClient::new(&url);

    let record = client.vehicle_with_documents(VIN).await.unwrap().unwrap();
    assert_eq!(record.vin, VIN);
    assert_eq!(record.owner_name, "John Doe");
    assert!(record.image_ipfs_hash.is_empty());

    assert!(client.vehicle_with_documents(OTHER_VIN).await.unwrap().is_none());
}
