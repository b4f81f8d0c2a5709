use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Local;

use parcelflow_config::{CarrierSettings, Credentials, PackageSettings, PickupAddress, Settings};
use parcelflow_recon::{order_file_stem, Carrier, CarrierError, Order, ShipmentConfirmation};

use crate::soap::{self, Operation, ShipmentRequest};

const USER_AGENT: &str = concat!("pflow/", env!("CARGO_PKG_VERSION"));

/// Blocking client for the carrier's SOAP business service.
///
/// Shipment creation is sent exactly once per call. Label retrieval is
/// idempotent and is retried on transport faults with a doubling backoff.
pub struct CanparClient {
    http: reqwest::blocking::Client,
    carrier: CarrierSettings,
    pickup: PickupAddress,
    package: PackageSettings,
    credentials: Credentials,
    responses_dir: Option<PathBuf>,
}

impl CanparClient {
    pub fn new(settings: &Settings, credentials: Credentials) -> Result<Self, CarrierError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.carrier.timeout_secs))
            .build()
            .map_err(|e| CarrierError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            carrier: settings.carrier.clone(),
            pickup: settings.pickup.clone(),
            package: settings.package.clone(),
            credentials,
            responses_dir: settings
                .carrier
                .save_responses
                .then(|| settings.paths.responses_dir()),
        })
    }

    /// POST one envelope and return the parsed response. HTTP errors without
    /// a SOAP fault body and network failures are transport faults.
    fn call(&self, operation: Operation, order_id: &str, envelope: String) -> Result<soap::Response, CarrierError> {
        tracing::debug!(order_id, action = operation.soap_action(), "calling carrier");

        let resp = self
            .http
            .post(&self.carrier.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", operation.soap_action())
            .body(envelope)
            .send()
            .map_err(|e| CarrierError::Transport(transport_message(&e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| CarrierError::Transport(format!("failed to read response body: {}", e)))?;

        // Faults usually arrive as HTTP 500, so look at the body first
        let parsed = soap::parse_response(&body);
        let is_fault = matches!(&parsed, Ok(r) if r.is_fault());
        self.archive_response(order_id, operation, is_fault, &body);

        if !status.is_success() && !is_fault {
            let snippet: String = body.chars().take(200).collect();
            return Err(CarrierError::Transport(format!("HTTP {}: {}", status.as_u16(), snippet)));
        }
        parsed
    }

    fn archive_response(&self, order_id: &str, operation: Operation, fault: bool, body: &str) {
        let Some(dir) = &self.responses_dir else { return };
        let suffix = if fault { "_fault" } else { "" };
        let path = dir.join(format!("{}_{}{}_response.xml", order_file_stem(order_id), operation.file_tag(), suffix));
        match write_response(&path, body) {
            Ok(()) => tracing::debug!(order_id, path = %path.display(), "saved carrier response"),
            Err(e) => tracing::warn!(order_id, path = %path.display(), error = %e, "could not save carrier response"),
        }
    }

    fn fetch_label_once(&self, order_id: &str, shipment_id: &str) -> Result<Vec<u8>, CarrierError> {
        let envelope = soap::get_labels_envelope(&self.credentials.user, &self.credentials.password, shipment_id);
        soap::label_result(self.call(Operation::GetLabels, order_id, envelope)?)
    }
}

impl Carrier for CanparClient {
    fn create_shipment(&mut self, order: &Order) -> Result<ShipmentConfirmation, CarrierError> {
        let request = ShipmentRequest {
            user: &self.credentials.user,
            password: &self.credentials.password,
            shipper_num: &self.carrier.shipper_num,
            service_type: &self.carrier.service_type,
            signature_required: self.carrier.signature_required,
            pickup: &self.pickup,
            package: &self.package,
            shipping_date: Local::now().naive_local(),
        };
        let envelope = soap::process_shipment_envelope(&request, order);
        let confirmation = soap::shipment_result(self.call(Operation::ProcessShipment, &order.order_id, envelope)?)?;
        tracing::info!(
            order_id = %order.order_id,
            shipment_id = %confirmation.shipment_id,
            tracking = confirmation.tracking_number.as_deref().unwrap_or("-"),
            "shipment created"
        );
        Ok(confirmation)
    }

    fn get_label(&mut self, order_id: &str, shipment_id: &str) -> Result<Vec<u8>, CarrierError> {
        let retries = self.carrier.label_retries;
        let mut backoff_ms = self.carrier.backoff_ms;

        for attempt in 0..=retries {
            match self.fetch_label_once(order_id, shipment_id) {
                Err(CarrierError::Transport(message)) if attempt < retries => {
                    tracing::warn!(
                        order_id,
                        shipment_id,
                        error = %message,
                        "label retry {}/{} in {}ms",
                        attempt + 1,
                        retries,
                        backoff_ms
                    );
                    thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms = backoff_ms.saturating_mul(2);
                }
                result => return result,
            }
        }

        Err(CarrierError::Transport("label retries exhausted".into()))
    }
}

fn transport_message(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}

fn write_response(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, body)
}
