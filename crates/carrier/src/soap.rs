// SOAP envelopes for the two carrier operations we speak
//
// Requests are small and fixed-shape, so they are rendered as text with every
// interpolated value escaped. Responses are walked with quick-xml, matching on
// local element names so namespace prefixes do not matter.

use base64::Engine;
use chrono::NaiveDateTime;
use quick_xml::escape::{escape, resolve_predefined_entity};
use quick_xml::events::Event;
use quick_xml::Reader;

use parcelflow_config::{PackageSettings, PickupAddress};
use parcelflow_recon::{CarrierError, Order, ShipmentConfirmation};

pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SERVICE_NS: &str = "http://ws.business.canship.canpar.com";
pub const REQUEST_NS: &str = "http://ws.dto.canship.canpar.com/xsd";
pub const DATA_NS: &str = "http://dto.canship.canpar.com/xsd";

/// The two operations, with the names used for SOAPAction and for archived
/// response files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ProcessShipment,
    GetLabels,
}

impl Operation {
    pub fn soap_action(self) -> &'static str {
        match self {
            Self::ProcessShipment => "urn:processShipment",
            Self::GetLabels => "urn:getLabels",
        }
    }

    /// Short name used in archived response file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            Self::ProcessShipment => "shipment",
            Self::GetLabels => "label",
        }
    }
}

/// Fixed shipper-side values for a shipment request.
#[derive(Debug, Clone)]
pub struct ShipmentRequest<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub shipper_num: &'a str,
    pub service_type: &'a str,
    pub signature_required: bool,
    pub pickup: &'a PickupAddress,
    pub package: &'a PackageSettings,
    pub shipping_date: NaiveDateTime,
}

// ── Requests ────────────────────────────────────────────────────────

fn field(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("<d:{name}>{}</d:{name}>", escape(value)));
}

fn envelope(operation: &str, body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="{env}" xmlns:ws="{svc}" xmlns:r="{req}" xmlns:d="{data}">"#,
            "<soapenv:Header/><soapenv:Body><ws:{op}><ws:request>{body}</ws:request></ws:{op}></soapenv:Body>",
            "</soapenv:Envelope>"
        ),
        env = ENVELOPE_NS,
        svc = SERVICE_NS,
        req = REQUEST_NS,
        data = DATA_NS,
        op = operation,
        body = body,
    )
}

fn credentials(out: &mut String, user: &str, password: &str) {
    out.push_str(&format!("<r:user_id>{}</r:user_id>", escape(user)));
    out.push_str(&format!("<r:password>{}</r:password>", escape(password)));
}

fn pickup_address(out: &mut String, pickup: &PickupAddress) {
    out.push_str("<d:pickup_address>");
    field(out, "name", &pickup.name);
    field(out, "address_line_1", &pickup.street);
    field(out, "city", &pickup.city);
    field(out, "province", &pickup.province);
    field(out, "postal_code", &pickup.postal_code);
    field(out, "country", &pickup.country);
    field(out, "phone", &pickup.phone);
    out.push_str("</d:pickup_address>");
}

fn delivery_address(out: &mut String, order: &Order) {
    out.push_str("<d:delivery_address>");
    field(out, "name", &order.customer_name());
    field(out, "address_line_1", &order.address_line_1);
    field(out, "address_line_2", &order.address_line_2);
    field(out, "city", &order.city);
    field(out, "province", &order.province);
    field(out, "postal_code", &order.postal_code);
    field(out, "country", &order.country);
    field(out, "phone", &order.phone);
    field(out, "email", &order.email);
    out.push_str("</d:delivery_address>");
}

pub fn process_shipment_envelope(req: &ShipmentRequest<'_>, order: &Order) -> String {
    let mut body = String::new();
    credentials(&mut body, req.user, req.password);

    body.push_str("<r:shipment>");
    field(&mut body, "shipper_num", req.shipper_num);
    field(&mut body, "shipping_date", &req.shipping_date.format("%Y-%m-%dT%H:%M:%S").to_string());
    field(&mut body, "service_type", req.service_type);
    pickup_address(&mut body, req.pickup);
    delivery_address(&mut body, order);

    body.push_str("<d:packages>");
    field(&mut body, "reported_weight", &req.package.weight_lbs.to_string());
    field(&mut body, "length", &req.package.length_in.to_string());
    field(&mut body, "width", &req.package.width_in.to_string());
    field(&mut body, "height", &req.package.height_in.to_string());
    field(&mut body, "declared_value", &order.total_decimal());
    body.push_str("</d:packages>");

    field(&mut body, "order_id", &order.order_id);
    field(&mut body, "description", &order.description());
    field(&mut body, "dimention_unit", "I");
    field(&mut body, "reported_weight_unit", "L");
    // nsr = "no signature required"
    field(&mut body, "nsr", if req.signature_required { "false" } else { "true" });
    body.push_str("</r:shipment>");

    envelope("processShipment", &body)
}

pub fn get_labels_envelope(user: &str, password: &str, shipment_id: &str) -> String {
    let mut body = String::new();
    credentials(&mut body, user, password);
    body.push_str(&format!("<r:id>{}</r:id>", escape(shipment_id)));
    body.push_str("<r:thermal>false</r:thermal>");
    envelope("getLabels", &body)
}

// ── Responses ───────────────────────────────────────────────────────

/// The parts of a response we care about, whichever operation produced it.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Response {
    /// `Some` when the body is a SOAP fault (message may be empty).
    pub fault: Option<String>,
    /// Carrier-level error text; empty or nil elements are ignored.
    pub error: Option<String>,
    pub shipment_id: Option<String>,
    /// Barcode of the first package.
    pub tracking_number: Option<String>,
    pub labels: Vec<String>,
}

impl Response {
    pub fn is_fault(&self) -> bool {
        self.fault.is_some()
    }
}

fn local(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

pub fn parse_response(xml: &str) -> Result<Response, CarrierError> {
    let mut reader = Reader::from_str(xml);

    let mut response = Response::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local(e.name().as_ref()).to_vec();
                if name == b"Fault" {
                    response.fault.get_or_insert_with(String::new);
                }
                path.push(name);
                text.clear();
            }
            Ok(Event::Empty(ref e)) => {
                if local(e.name().as_ref()) == b"Fault" {
                    response.fault.get_or_insert_with(String::new);
                }
            }
            Ok(Event::Text(ref e)) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::CData(ref e)) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            // Entity and character references arrive between text events
            Ok(Event::GeneralRef(ref e)) => match e.resolve_char_ref() {
                Ok(Some(ch)) => text.push(ch),
                Ok(None) => {
                    let name = String::from_utf8_lossy(e.as_ref());
                    match resolve_predefined_entity(&name) {
                        Some(resolved) => text.push_str(resolved),
                        None => {
                            text.push('&');
                            text.push_str(&name);
                            text.push(';');
                        }
                    }
                }
                Err(err) => {
                    return Err(CarrierError::data(format!(
                        "bad character reference at byte {}: {}",
                        reader.buffer_position(),
                        err
                    )))
                }
            },
            Ok(Event::End(_)) => {
                let value = text.trim().to_string();
                collect(&mut response, &path, value);
                path.pop();
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CarrierError::data(format!(
                    "malformed response XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(response)
}

fn collect(response: &mut Response, path: &[Vec<u8>], value: String) {
    let Some(element) = path.last() else { return };
    let parent = path.len().checked_sub(2).map(|i| path[i].as_slice());
    if value.is_empty() {
        return;
    }

    match (element.as_slice(), parent) {
        (b"faultstring", _) => response.fault = Some(value),
        (b"error", _) if response.error.is_none() => response.error = Some(value),
        (b"id", Some(b"shipment")) if response.shipment_id.is_none() => {
            response.shipment_id = Some(value)
        }
        (b"barcode", Some(b"packages")) if response.tracking_number.is_none() => {
            response.tracking_number = Some(value)
        }
        (b"labels", _) => response.labels.push(value),
        _ => {}
    }
}

/// Interpret a processShipment response body.
pub fn shipment_result(response: Response) -> Result<ShipmentConfirmation, CarrierError> {
    if let Some(fault) = response.fault {
        return Err(CarrierError::Transport(fault_message(fault)));
    }
    if let Some(error) = response.error {
        return Err(CarrierError::Remote(error));
    }
    let shipment_id = response
        .shipment_id
        .ok_or_else(|| CarrierError::data("shipment response has no shipment id"))?;
    Ok(ShipmentConfirmation { shipment_id, tracking_number: response.tracking_number })
}

/// Interpret a getLabels response body into PDF bytes.
pub fn label_result(response: Response) -> Result<Vec<u8>, CarrierError> {
    if let Some(fault) = response.fault {
        return Err(CarrierError::Transport(fault_message(fault)));
    }
    if let Some(error) = response.error {
        return Err(CarrierError::Remote(error));
    }
    let Some(payload) = response.labels.into_iter().next() else {
        return Err(CarrierError::data("label response contains no labels"));
    };
    decode_label(&payload)
}

pub fn decode_label(payload: &str) -> Result<Vec<u8>, CarrierError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CarrierError::Data {
            message: format!("label payload is not valid base64: {}", e),
            payload: Some(payload.to_string()),
        })
}

fn fault_message(fault: String) -> String {
    if fault.is_empty() {
        "SOAP fault".into()
    } else {
        format!("SOAP fault: {}", fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn order() -> Order {
        Order {
            order_id: "A1".into(),
            first_name: "Jane".into(),
            last_name: "Smith & Co".into(),
            email: "jane@example.com".into(),
            phone: "5551234".into(),
            address_line_1: "456 Oak Ave".into(),
            address_line_2: String::new(),
            city: "Someplace".into(),
            province: "QC".into(),
            postal_code: "H1H1H1".into(),
            country: "CA".into(),
            total_cents: 4999,
            product_sku: "SKU-1".into(),
            quantity: 2,
        }
    }

    const SHIPMENT_OK: &str = r#"<?xml version="1.0"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>
    <ns:processShipmentResponse xmlns:ns="http://ws.business.canship.canpar.com" xmlns:ax="http://dto.canship.canpar.com/xsd">
      <ns:return>
        <ax:error xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"/>
        <ax:processShipmentResult>
          <ax:shipment>
            <ax:delivery_address><ax:id>7</ax:id></ax:delivery_address>
            <ax:id>99</ax:id>
            <ax:packages><ax:barcode>D123</ax:barcode></ax:packages>
            <ax:packages><ax:barcode>D124</ax:barcode></ax:packages>
          </ax:shipment>
        </ax:processShipmentResult>
      </ns:return>
    </ns:processShipmentResponse>
  </soapenv:Body>
</soapenv:Envelope>"#;

    #[test]
    fn shipment_envelope_carries_order_and_shipper() {
        let pickup = PickupAddress { name: "Warehouse".into(), ..Default::default() };
        let package = PackageSettings::default();
        let req = ShipmentRequest {
            user: "u",
            password: "p<w>",
            shipper_num: "42",
            service_type: "1",
            signature_required: true,
            pickup: &pickup,
            package: &package,
            shipping_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
        };
        let xml = process_shipment_envelope(&req, &order());

        assert!(xml.contains("<ws:processShipment>"));
        assert!(xml.contains("<r:password>p&lt;w&gt;</r:password>"));
        assert!(xml.contains("<d:name>Jane Smith &amp; Co</d:name>"));
        assert!(xml.contains("<d:declared_value>49.99</d:declared_value>"));
        assert!(xml.contains("<d:description>2x SKU-1</d:description>"));
        assert!(xml.contains("<d:shipping_date>2026-03-01T09:00:00</d:shipping_date>"));
        assert!(xml.contains("<d:nsr>false</d:nsr>"));
        assert!(xml.contains("<d:name>Warehouse</d:name>"));
        // Our own envelope is well-formed
        assert_eq!(parse_response(&xml).unwrap().fault, None);
    }

    #[test]
    fn parses_shipment_id_and_first_barcode() {
        let confirmation = shipment_result(parse_response(SHIPMENT_OK).unwrap()).unwrap();
        assert_eq!(confirmation.shipment_id, "99");
        assert_eq!(confirmation.tracking_number.as_deref(), Some("D123"));
    }

    #[test]
    fn error_element_is_remote() {
        let xml = SHIPMENT_OK.replace(
            r#"<ax:error xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"/>"#,
            "<ax:error>Invalid postal code</ax:error>",
        );
        let err = shipment_result(parse_response(&xml).unwrap()).unwrap_err();
        assert_eq!(err, CarrierError::Remote("Invalid postal code".into()));
    }

    #[test]
    fn fault_is_transport() {
        let xml = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
            <soapenv:Body><soapenv:Fault><faultcode>soapenv:Server</faultcode>
            <faultstring>Authentication failed</faultstring></soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;
        let response = parse_response(xml).unwrap();
        assert!(response.is_fault());
        assert_eq!(
            label_result(response).unwrap_err(),
            CarrierError::Transport("SOAP fault: Authentication failed".into())
        );
    }

    #[test]
    fn escaped_text_is_resolved() {
        let xml = "<Envelope><Body><return><error> Bad &amp; wrong &lt;postal&gt; &#233;t&#xE9; </error>\
                   <shipment><id>99&#45;1</id></shipment></return></Body></Envelope>";
        let response = parse_response(xml).unwrap();
        assert_eq!(response.error.as_deref(), Some("Bad & wrong <postal> été"));
        assert_eq!(response.shipment_id.as_deref(), Some("99-1"));

        let fault = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
            <soapenv:Body><soapenv:Fault><faultstring>User &apos;u&apos; &amp; key rejected</faultstring>
            </soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;
        assert_eq!(parse_response(fault).unwrap().fault.as_deref(), Some("User 'u' & key rejected"));
    }

    #[test]
    fn missing_shipment_id_is_data_error() {
        let xml = "<Envelope><Body><return><error/></return></Body></Envelope>";
        let err = shipment_result(parse_response(xml).unwrap()).unwrap_err();
        assert!(matches!(err, CarrierError::Data { payload: None, .. }));
    }

    #[test]
    fn label_decodes_first_payload() {
        let xml = "<Envelope><Body><return><labels>JVBERi0x\nLjQ=</labels><labels>eHh4</labels></return></Body></Envelope>";
        assert_eq!(label_result(parse_response(xml).unwrap()).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn no_labels_is_data_error() {
        let xml = "<Envelope><Body><return><error></error></return></Body></Envelope>";
        let err = label_result(parse_response(xml).unwrap()).unwrap_err();
        assert_eq!(err, CarrierError::data("label response contains no labels"));
    }

    #[test]
    fn invalid_base64_keeps_payload() {
        match decode_label("not base64!") {
            Err(CarrierError::Data { payload, .. }) => assert_eq!(payload.as_deref(), Some("not base64!")),
            other => panic!("expected data error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_xml_is_data_error() {
        let err = parse_response("<a><b></a>").unwrap_err();
        assert!(matches!(err, CarrierError::Data { .. }));
    }

    #[test]
    fn labels_envelope_escapes_id() {
        let xml = get_labels_envelope("u", "p", "9&9");
        assert!(xml.contains("<r:id>9&amp;9</r:id>"));
        assert!(xml.contains("<ws:getLabels>"));
    }
}
