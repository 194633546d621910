use api_contract::{
    BusAddress, BusFault, BusRequest, BusResponse, FaultCode, Operation, ReadRequest,
    ServerInfoRequest, ServiceRecord, connector_endpoint,
};

#[test]
fn addresses_render_root_connector_operation() {
    let address = BusAddress::new("Opc", "dev1", Operation::Read);
    assert_eq!(address.to_string(), "Opc/dev1/Read");
    assert_eq!(BusAddress::parse("Opc/dev1/Read"), Some(address));
    assert_eq!(connector_endpoint("Opc", "dev1"), "Opc/dev1");
}

#[test]
fn every_operation_gets_an_address() {
    let addresses: Vec<String> = BusAddress::all_for("root", "dev1")
        .iter()
        .map(ToString::to_string)
        .collect();

    assert_eq!(
        addresses,
        vec![
            "root/dev1/ServerInfo",
            "root/dev1/Subscribe",
            "root/dev1/Unsubscribe",
            "root/dev1/Publish",
            "root/dev1/Read",
            "root/dev1/Write",
            "root/dev1/Browse",
        ]
    );
}

#[test]
fn malformed_addresses_do_not_parse() {
    assert_eq!(BusAddress::parse("dev1/Read"), None);
    assert_eq!(BusAddress::parse("Opc/dev1/Delete"), None);
    assert_eq!(BusAddress::parse("Opc//Read"), None);
}

#[test]
fn requests_expose_id_and_operation() {
    let read = BusRequest::Read(ReadRequest {
        id: "r-1".to_string(),
        node_ids: vec!["ns=2;s=A".to_string()],
    });
    assert_eq!(read.id(), "r-1");
    assert_eq!(read.operation(), Operation::Read);

    let info = BusRequest::ServerInfo(ServerInfoRequest {
        id: "r-2".to_string(),
    });
    assert_eq!(info.operation(), Operation::ServerInfo);
}

#[test]
fn unavailable_fault_is_distinguishable() {
    let response = BusResponse::fault("r-1", BusFault::unavailable("dev1", "Reconnecting"));
    let fault = response.result.unwrap_err();

    assert!(fault.is_unavailable());
    assert_eq!(fault.code.as_str(), "BUS.UNAVAILABLE");
    assert_eq!(fault.to_string(), "BUS.UNAVAILABLE: connector dev1 is Reconnecting");
    assert!(!BusFault::new(FaultCode::Failed, "x").is_unavailable());
}

#[test]
fn service_record_serializes_pascal_case() {
    let record = ServiceRecord::new("dev1", "Opc", "Opc/dev1");
    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["Name"], "dev1");
    assert_eq!(json["ServiceType"], "Opc");
    assert_eq!(json["Endpoint"], "Opc/dev1");
    assert!(json.get("Registration").is_none());
    assert_eq!(record.location()["endpoint"], "Opc/dev1");
}
