use super::*;

fn brightness() -> Characteristic {
    Characteristic {
        iid: 9,
        characteristic_type: "00000008-0000-1000-8000-0026BB765291".to_string(),
        value: Some(CharacteristicValue::Int(40)),
        perms: vec![Permission::PairedRead, Permission::PairedWrite],
        format: CharacteristicFormat::Int,
        unit: Some("percentage".to_string()),
        min_value: Some(0.0),
        max_value: Some(100.0),
        min_step: Some(1.0),
    }
}

#[test]
fn parse_accessory_tree() {
    let json = r#"{
        "accessories": [{
            "aid": 1,
            "services": [{
                "iid": 8,
                "type": "00000043-0000-1000-8000-0026BB765291",
                "characteristics": [{
                    "iid": 9,
                    "type": "00000025-0000-1000-8000-0026BB765291",
                    "value": true,
                    "perms": ["pr", "pw", "ev"],
                    "format": "bool"
                }, {
                    "iid": 10,
                    "type": "00000008-0000-1000-8000-0026BB765291",
                    "value": 40,
                    "perms": ["pr", "pw"],
                    "format": "int",
                    "minValue": 0,
                    "maxValue": 100,
                    "minStep": 1
                }]
            }]
        }]
    }"#;

    let db: AccessoryDatabase = serde_json::from_str(json).unwrap();
    let accessory = db.accessory(1).unwrap();
    assert_eq!(accessory.services.len(), 1);

    let on = accessory.characteristic(9).unwrap();
    assert_eq!(on.value, Some(CharacteristicValue::Bool(true)));
    assert!(on.is_writable());
    assert!(on.is_readable());

    let level = accessory.characteristic(10).unwrap();
    assert_eq!(level.max_value, Some(100.0));
    assert_eq!(level.value, Some(CharacteristicValue::Int(40)));
}

#[test]
fn write_above_max_is_rejected() {
    let c = brightness();
    let err = c.validate(&CharacteristicValue::Int(150)).unwrap_err();
    assert!(err.contains("above maximum"));
}

#[test]
fn write_below_min_is_rejected() {
    let c = brightness();
    let err = c.validate(&CharacteristicValue::Int(-1)).unwrap_err();
    assert!(err.contains("below minimum"));
}

#[test]
fn write_in_range_passes() {
    let c = brightness();
    c.validate(&CharacteristicValue::Int(100)).unwrap();
    c.validate(&CharacteristicValue::Int(0)).unwrap();
}

#[test]
fn write_off_step_is_rejected() {
    let mut c = brightness();
    c.format = CharacteristicFormat::Float;
    c.min_step = Some(0.5);

    c.validate(&CharacteristicValue::Float(22.5)).unwrap();
    let err = c.validate(&CharacteristicValue::Float(22.3)).unwrap_err();
    assert!(err.contains("step"));
}

#[test]
fn write_wrong_format_is_rejected() {
    let c = brightness();
    let err = c
        .validate(&CharacteristicValue::String("on".to_string()))
        .unwrap_err();
    assert!(err.contains("format"));
}

#[test]
fn write_to_read_only_is_rejected() {
    let mut c = brightness();
    c.perms = vec![Permission::PairedRead];
    let err = c.validate(&CharacteristicValue::Int(1)).unwrap_err();
    assert!(err.contains("not writable"));
}

#[test]
fn uint8_range_enforced() {
    let mut c = brightness();
    c.format = CharacteristicFormat::UInt8;
    c.min_value = None;
    c.max_value = None;
    c.min_step = None;

    c.validate(&CharacteristicValue::Int(255)).unwrap();
    assert!(c.validate(&CharacteristicValue::Int(256)).is_err());
    assert!(c.validate(&CharacteristicValue::Int(-1)).is_err());
}

#[test]
fn bool_reinterpreted_from_integer() {
    let value = CharacteristicValue::Int(1).reinterpret_for(CharacteristicFormat::Bool);
    assert_eq!(value, CharacteristicValue::Bool(true));
}

#[test]
fn binary_roundtrips_as_base64() {
    let value = CharacteristicValue::Binary(vec![1, 2, 3, 255]);
    let json = serde_json::to_string(&value).unwrap();
    assert_eq!(json, "\"AQID/w==\"");

    let back: CharacteristicValue = serde_json::from_str(&json).unwrap();
    let back = back.reinterpret_for(CharacteristicFormat::Data);
    assert_eq!(back, value);
}

#[test]
fn write_request_body_shape() {
    let body = CharacteristicsBody {
        characteristics: vec![CharacteristicEntry {
            aid: 1,
            iid: 9,
            value: Some(CharacteristicValue::Bool(true)),
            status: None,
        }],
    };

    let json = serde_json::to_string(&body).unwrap();
    assert_eq!(json, r#"{"characteristics":[{"aid":1,"iid":9,"value":true}]}"#);
}
