// Integration tests for the carrier client against a mock SOAP endpoint.
// Run with: cargo test -p parcelflow-carrier --test client

use httpmock::prelude::*;
use tempfile::TempDir;

use parcelflow_carrier::CanparClient;
use parcelflow_config::{CredentialSource, Credentials, Settings};
use parcelflow_recon::{Carrier, CarrierError, Order};

fn order(id: &str) -> Order {
    Order {
        order_id: id.into(),
        first_name: "Jane".into(),
        last_name: "Smith".into(),
        email: "jane@example.com".into(),
        phone: String::new(),
        address_line_1: "456 Oak Ave".into(),
        address_line_2: String::new(),
        city: "Someplace".into(),
        province: "QC".into(),
        postal_code: "H1H1H1".into(),
        country: "CA".into(),
        total_cents: 4999,
        product_sku: "SKU-1".into(),
        quantity: 1,
    }
}

fn credentials() -> Credentials {
    Credentials {
        user: "api-user".into(),
        password: "api-pass".into(),
        user_source: CredentialSource::Flag,
        password_source: CredentialSource::Flag,
    }
}

fn settings(endpoint: String, state: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.carrier.endpoint = endpoint;
    settings.carrier.shipper_num = "42".into();
    settings.carrier.label_retries = 2;
    settings.carrier.backoff_ms = 0;
    settings.carrier.timeout_secs = 5;
    settings.paths.state_dir = state.path().to_path_buf();
    settings
}

fn client(server: &MockServer, state: &TempDir) -> CanparClient {
    CanparClient::new(&settings(server.url("/svc"), state), credentials()).unwrap()
}

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0"?><soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body>{}</soapenv:Body></soapenv:Envelope>"#,
        body
    )
}

fn shipment_ok(id: &str, barcode: &str) -> String {
    envelope(&format!(
        "<ns:processShipmentResponse><ns:return><ax:error/><ax:processShipmentResult><ax:shipment>\
         <ax:id>{id}</ax:id><ax:packages><ax:barcode>{barcode}</ax:barcode></ax:packages>\
         </ax:shipment></ax:processShipmentResult></ns:return></ns:processShipmentResponse>"
    ))
}

fn labels_ok(payload: &str) -> String {
    envelope(&format!(
        "<ns:getLabelsResponse><ns:return><ax:error/><ax:labels>{payload}</ax:labels></ns:return></ns:getLabelsResponse>"
    ))
}

fn fault(message: &str) -> String {
    envelope(&format!(
        "<soapenv:Fault><faultcode>soapenv:Server</faultcode><faultstring>{message}</faultstring></soapenv:Fault>"
    ))
}

// ── processShipment ─────────────────────────────────────────────────

#[test]
fn create_shipment_returns_id_and_tracking() {
    let server = MockServer::start();
    let state = TempDir::new().unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/svc")
            .header("SOAPAction", "urn:processShipment");
        then.status(200)
            .header("Content-Type", "text/xml")
            .body(shipment_ok("99", "D123"));
    });

    let confirmation = client(&server, &state).create_shipment(&order("A1")).unwrap();
    mock.assert();
    assert_eq!(confirmation.shipment_id, "99");
    assert_eq!(confirmation.tracking_number.as_deref(), Some("D123"));

    let saved = state.path().join("xml_responses/A1_shipment_response.xml");
    assert!(saved.exists(), "raw response should be archived");
}

#[test]
fn carrier_error_element_is_remote_and_not_retried() {
    let server = MockServer::start();
    let state = TempDir::new().unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/svc");
        then.status(200).body(envelope(
            "<ns:processShipmentResponse><ns:return><ax:error>Invalid postal code</ax:error></ns:return></ns:processShipmentResponse>",
        ));
    });

    let err = client(&server, &state).create_shipment(&order("A1")).unwrap_err();
    mock.assert_calls(1);
    assert_eq!(err, CarrierError::Remote("Invalid postal code".into()));
}

#[test]
fn shipment_http_error_is_transport_and_sent_once() {
    let server = MockServer::start();
    let state = TempDir::new().unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/svc");
        then.status(503).body("Service Unavailable");
    });

    let err = client(&server, &state).create_shipment(&order("A1")).unwrap_err();
    mock.assert_calls(1);
    match err {
        CarrierError::Transport(message) => assert!(message.contains("HTTP 503"), "message: {}", message),
        other => panic!("expected transport fault, got {:?}", other),
    }
}

#[test]
fn soap_fault_is_transport_and_archived_as_fault() {
    let server = MockServer::start();
    let state = TempDir::new().unwrap();

    server.mock(|when, then| {
        when.method(POST).path("/svc");
        then.status(500).body(fault("Authentication failed"));
    });

    let err = client(&server, &state).create_shipment(&order("A1")).unwrap_err();
    assert_eq!(err, CarrierError::Transport("SOAP fault: Authentication failed".into()));
    assert!(state.path().join("xml_responses/A1_shipment_fault_response.xml").exists());
}

#[test]
fn unreachable_endpoint_is_transport() {
    let state = TempDir::new().unwrap();
    let mut client =
        CanparClient::new(&settings("http://127.0.0.1:1/svc".into(), &state), credentials()).unwrap();

    let err = client.create_shipment(&order("A1")).unwrap_err();
    assert!(matches!(err, CarrierError::Transport(_)), "got {:?}", err);
}

// ── getLabels ───────────────────────────────────────────────────────

#[test]
fn get_label_decodes_pdf() {
    let server = MockServer::start();
    let state = TempDir::new().unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/svc")
            .header("SOAPAction", "urn:getLabels");
        then.status(200).body(labels_ok("JVBERi0xLjQ="));
    });

    let pdf = client(&server, &state).get_label("A1", "99").unwrap();
    mock.assert();
    assert_eq!(pdf, b"%PDF-1.4");
    assert!(state.path().join("xml_responses/A1_label_response.xml").exists());
}

#[test]
fn get_label_retries_transport_faults() {
    let server = MockServer::start();
    let state = TempDir::new().unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/svc");
        then.status(502).body("Bad Gateway");
    });

    let err = client(&server, &state).get_label("A1", "99").unwrap_err();
    // one attempt plus two retries
    mock.assert_calls(3);
    assert!(matches!(err, CarrierError::Transport(_)));
}

#[test]
fn get_label_does_not_retry_bad_payload() {
    let server = MockServer::start();
    let state = TempDir::new().unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/svc");
        then.status(200).body(labels_ok("%%%not-base64%%%"));
    });

    let err = client(&server, &state).get_label("A1", "99").unwrap_err();
    mock.assert_calls(1);
    match err {
        CarrierError::Data { payload, .. } => assert_eq!(payload.as_deref(), Some("%%%not-base64%%%")),
        other => panic!("expected data error, got {:?}", other),
    }
}

#[test]
fn responses_not_saved_when_disabled() {
    let server = MockServer::start();
    let state = TempDir::new().unwrap();

    server.mock(|when, then| {
        when.method(POST).path("/svc");
        then.status(200).body(labels_ok("JVBERi0xLjQ="));
    });

    let mut settings = settings(server.url("/svc"), &state);
    settings.carrier.save_responses = false;
    let mut client = CanparClient::new(&settings, credentials()).unwrap();

    client.get_label("A1", "99").unwrap();
    assert!(!state.path().join("xml_responses").exists());
}
