use proptest::prelude::*;
use prost::Message;

use crate::v1::{
    AddSessionRequestV1, ListSessionsResponseV1, SessionStateV1, SessionTypeV1, SessionV1,
};

prop_compose! {
    fn any_session()(
        label in ".{0,32}",
        state in 0..4i32,
        typ in 0..4i32,
        expiry in any::<u64>(),
        addr in "[a-z0-9.:]{0,40}",
        dev in any::<bool>(),
        secret in prop::collection::vec(any::<u8>(), 14),
        local in prop::collection::vec(any::<u8>(), 33),
        remote in prop::option::of(prop::collection::vec(any::<u8>(), 33)),
    ) -> SessionV1 {
        SessionV1 {
            label,
            session_state: state,
            session_type: typ,
            expiry_timestamp_seconds: expiry,
            mailbox_server_addr: addr,
            dev_server: dev,
            pairing_secret: secret,
            pairing_secret_mnemonic: String::new(),
            local_public_key: local,
            remote_public_key: remote.unwrap_or_default(),
        }
    }
}

proptest! {
    #[test]
    fn session_list_decodes_to_same_message(sessions in prop::collection::vec(any_session(), 0..8)) {
        let resp = ListSessionsResponseV1 { sessions };
        let bytes = resp.encode_to_vec();
        let decoded = ListSessionsResponseV1::decode(bytes.as_slice()).unwrap();
        prop_assert_eq!(decoded, resp);
    }

    #[test]
    fn unknown_enum_values_survive_decoding(raw in 4..i32::MAX) {
        // Out-of-range values are preserved as raw integers; rejecting them
        // is left to the session translator.
        let req = AddSessionRequestV1 { session_type: raw, ..Default::default() };
        let decoded = AddSessionRequestV1::decode(req.encode_to_vec().as_slice()).unwrap();
        prop_assert_eq!(decoded.session_type, raw);
        prop_assert!(SessionTypeV1::try_from(raw).is_err());
    }
}

#[test]
fn enum_values_match_schema() {
    assert_eq!(SessionStateV1::Created as i32, 0);
    assert_eq!(SessionStateV1::InUse as i32, 1);
    assert_eq!(SessionStateV1::Revoked as i32, 2);
    assert_eq!(SessionStateV1::Expired as i32, 3);

    assert_eq!(SessionTypeV1::MacaroonReadonly as i32, 0);
    assert_eq!(SessionTypeV1::MacaroonAdmin as i32, 1);
    assert_eq!(SessionTypeV1::MacaroonCustom as i32, 2);
    assert_eq!(SessionTypeV1::UiPassword as i32, 3);

    assert_eq!(SessionTypeV1::UiPassword.as_str_name(), "TYPE_UI_PASSWORD");
    assert_eq!(SessionStateV1::InUse.as_str_name(), "STATE_IN_USE");
}
