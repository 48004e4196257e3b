//! Protocol-Buffers message schemas for the lobby commands this tool reads.
//!
//! Every message also derives serde with camelCase field names, which is the
//! JSON shape decoded snapshots are persisted in.

use serde::{Deserialize, Serialize};

/// A single item property roll.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemProperty {
    #[prost(string, tag = "1")]
    pub property_type_id: String,
    #[prost(int32, tag = "2")]
    pub property_value: i32,
}

/// One item instance as the server describes it.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemInfo {
    #[prost(uint64, tag = "1")]
    pub item_unique_id: u64,
    /// Design id, e.g. `DesignDataItem:Id_Item_BloodsapBlade_5001`.
    #[prost(string, tag = "2")]
    pub item_id: String,
    #[prost(uint32, tag = "3")]
    pub item_count: u32,
    #[prost(uint32, tag = "4")]
    pub inventory_id: u32,
    /// Linear slot index. Absent for items the server has not laid out.
    #[prost(uint32, optional, tag = "5")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<u32>,
    #[prost(uint32, tag = "6")]
    pub item_contents_count: u32,
    #[prost(message, repeated, tag = "7")]
    pub primary_properties: Vec<ItemProperty>,
    #[prost(message, repeated, tag = "8")]
    pub secondary_properties: Vec<ItemProperty>,
}

#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Nickname {
    #[prost(string, tag = "1")]
    pub original: String,
    #[prost(string, tag = "2")]
    pub streaming_mode: String,
    #[prost(string, tag = "3")]
    pub rank_id: String,
    #[prost(uint32, tag = "4")]
    pub fame: u32,
    #[prost(uint32, tag = "5")]
    pub rank_icon_type: u32,
}

/// Contents of one storage container.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageInfo {
    #[prost(uint32, tag = "1")]
    pub inventory_id: u32,
    #[prost(message, repeated, tag = "2")]
    pub items: Vec<ItemInfo>,
}

/// The character detail carried by command 44.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterDataBase {
    #[prost(uint64, tag = "1")]
    pub character_id: u64,
    #[prost(message, optional, tag = "2")]
    pub nickname: Option<Nickname>,
    #[prost(string, tag = "3")]
    pub character_class: String,
    #[prost(uint32, tag = "4")]
    pub gender: u32,
    #[prost(uint32, tag = "5")]
    pub level: u32,
    /// Carried items (bag and equipment), each tagged with its inventory id.
    #[prost(message, repeated, tag = "6")]
    pub item_list: Vec<ItemInfo>,
    #[prost(message, repeated, tag = "7")]
    pub storage_infos: Vec<StorageInfo>,
}

impl CharacterDataBase {
    /// Display name, falling back to the numeric id.
    pub fn display_name(&self) -> String {
        match &self.nickname {
            Some(n) if !n.original.is_empty() => n.original.clone(),
            _ => self.character_id.to_string(),
        }
    }
}

/// `S2C_LOBBY_CHARACTER_INFO_RES` (44).
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterInfoResponse {
    #[prost(uint32, tag = "1")]
    pub result: u32,
    #[prost(message, optional, tag = "2")]
    pub character_data_base: Option<CharacterDataBase>,
}

impl CharacterInfoResponse {
    /// Result code the server sends for a successful lookup.
    pub const RESULT_OK: u32 = 1;

    /// Returns the character detail if the response is a successful one.
    pub fn character(&self) -> Option<&CharacterDataBase> {
        if self.result == Self::RESULT_OK {
            self.character_data_base.as_ref()
        } else {
            None
        }
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterSummary {
    #[prost(uint64, tag = "1")]
    pub character_id: u64,
    #[prost(message, optional, tag = "2")]
    pub nickname: Option<Nickname>,
    #[prost(string, tag = "3")]
    pub character_class: String,
    #[prost(uint32, tag = "4")]
    pub level: u32,
}

/// `S2C_ACCOUNT_CHARACTER_LIST_RES` (18).
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterListResponse {
    #[prost(uint32, tag = "1")]
    pub result: u32,
    #[prost(uint32, tag = "2")]
    pub total_character_count: u32,
    #[prost(uint32, tag = "3")]
    pub page_index: u32,
    #[prost(message, repeated, tag = "4")]
    pub character_list: Vec<CharacterSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn item(unique: u64, id: &str, slot: Option<u32>) -> ItemInfo {
        ItemInfo {
            item_unique_id: unique,
            item_id: id.to_string(),
            item_count: 1,
            inventory_id: 4,
            slot_id: slot,
            ..Default::default()
        }
    }

    #[test]
    fn test_character_info_wire_decode() {
        let msg = CharacterInfoResponse {
            result: 1,
            character_data_base: Some(CharacterDataBase {
                character_id: 77,
                nickname: Some(Nickname {
                    original: "Rogue".to_string(),
                    ..Default::default()
                }),
                storage_infos: vec![StorageInfo {
                    inventory_id: 4,
                    items: vec![
                        item(1, "DesignDataItem:Id_Item_Torch_1001", Some(0)),
                        item(2, "DesignDataItem:Id_Item_Lantern_2001", None),
                    ],
                }],
                ..Default::default()
            }),
        };

        let bytes = msg.encode_to_vec();
        let decoded = CharacterInfoResponse::decode(bytes.as_slice()).unwrap();
        let character = decoded.character().unwrap();
        assert_eq!(character.character_id, 77);
        assert_eq!(character.display_name(), "Rogue");
        let items = &character.storage_infos[0].items;
        assert_eq!(items[0].slot_id, Some(0));
        assert_eq!(items[1].slot_id, None);
    }

    #[test]
    fn test_slot_zero_is_distinct_from_absent() {
        // proto3 would drop an implicit zero; the optional keeps slot 0 explicit.
        let with_zero = item(1, "x", Some(0)).encode_to_vec();
        let without = item(1, "x", None).encode_to_vec();
        assert_ne!(with_zero, without);
    }

    #[test]
    fn test_failed_result_has_no_character() {
        let msg = CharacterInfoResponse {
            result: 0,
            character_data_base: Some(CharacterDataBase::default()),
        };
        assert!(msg.character().is_none());
    }

    #[test]
    fn test_json_shape() {
        let msg = CharacterInfoResponse {
            result: 1,
            character_data_base: Some(CharacterDataBase {
                character_id: 5,
                storage_infos: vec![StorageInfo {
                    inventory_id: 20,
                    items: vec![item(9, "DesignDataItem:Id_Item_Axe_3001", None)],
                }],
                ..Default::default()
            }),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["characterDataBase"]["characterId"], 5);
        let first = &json["characterDataBase"]["storageInfos"][0]["items"][0];
        assert_eq!(first["itemUniqueId"], 9);
        assert!(first.get("slotId").is_none());

        let back: CharacterInfoResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_json_tolerates_missing_fields() {
        let back: CharacterInfoResponse =
            serde_json::from_str(r#"{"result": 1, "characterDataBase": {"characterId": 3}}"#)
                .unwrap();
        assert_eq!(back.character().unwrap().character_id, 3);
        assert!(back.character().unwrap().storage_infos.is_empty());
    }
}
