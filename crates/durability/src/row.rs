//! Row mapping
//!
//! Feature rows are read in two steps: [`FeatureRow::from_row`] copies the
//! raw columns out of the statement, and [`FeatureRow::decode`] turns the
//! blobs into a [`Feature`] once the statement is done.

use featuredb_core::types::{timestamp_from_raw, AltitudeMode};
use featuredb_core::{Feature, FeatureId, FeatureSet, FeatureSetId, IgnoredFields};
use featuredb_engine::SortKey;
use rusqlite::Row;
use tracing::error;

use crate::codec::{attributes, style_codec, wkb, AttributeSchema, CodecError};

/// Raw columns of one feature row
#[derive(Debug, Clone)]
pub struct FeatureRow {
    /// Feature id
    pub fid: FeatureId,
    /// Owning set
    pub fsid: FeatureSetId,
    /// Feature name
    pub name: Option<String>,
    /// WKB geometry, absent when not selected
    pub geometry: Option<Vec<u8>>,
    /// Style coding and encoded bytes
    pub style: Option<(String, Vec<u8>)>,
    /// Encoded attribute set
    pub attributes: Option<Vec<u8>>,
    /// Altitude mode code
    pub altitude_mode: i64,
    /// Extrusion height
    pub extrude: f64,
    /// Raw timestamp
    pub timestamp: i64,
    /// Feature version
    pub version: i64,
    /// Effective maximum level of detail
    pub max_lod: i32,
    /// One distance per distance order
    pub distances: Vec<f64>,
}

impl FeatureRow {
    /// Read the columns of a feature or key projection
    pub fn from_row(row: &Row<'_>, distance_count: usize) -> rusqlite::Result<Self> {
        let coding: Option<String> = row.get(4)?;
        let style_value: Option<Vec<u8>> = row.get(5)?;
        let mut distances = Vec::with_capacity(distance_count);
        for i in 0..distance_count {
            let d: Option<f64> = row.get(12 + i)?;
            distances.push(d.unwrap_or(f64::INFINITY));
        }
        Ok(Self {
            fid: row.get(0)?,
            fsid: row.get(1)?,
            name: row.get(2)?,
            geometry: row.get(3)?,
            style: coding.zip(style_value),
            attributes: row.get(6)?,
            altitude_mode: row.get(7)?,
            extrude: row.get(8)?,
            timestamp: row.get(9)?,
            version: row.get(10)?,
            max_lod: row.get(11)?,
            distances,
        })
    }

    /// Comparison key of this row
    pub fn sort_key(&self) -> SortKey {
        SortKey {
            id: self.fid,
            name: self.name.clone(),
            distances: self.distances.clone(),
            max_lod: self.max_lod,
        }
    }

    /// Decode into a feature
    ///
    /// A corrupt blob leaves its field empty and logs an error; the rest of
    /// the feature is still returned.
    pub fn decode(self, schema: &AttributeSchema, ignored: IgnoredFields) -> Feature {
        let fid = self.fid;
        let geometry = self
            .geometry
            .filter(|_| !ignored.contains(IgnoredFields::GEOMETRY))
            .and_then(|bytes| logged(fid, "geometry", wkb::decode(&bytes)));
        let style = self
            .style
            .filter(|_| !ignored.contains(IgnoredFields::STYLE))
            .and_then(|(coding, bytes)| {
                logged(fid, "style", style_codec(&coding).and_then(|codec| codec.decode(&bytes)))
            });
        let attributes = self
            .attributes
            .filter(|_| !ignored.contains(IgnoredFields::ATTRIBUTES))
            .and_then(|bytes| logged(fid, "attributes", attributes::decode(&bytes, schema)));
        let mut feature = Feature {
            id: fid,
            feature_set_id: self.fsid,
            name: self.name,
            geometry,
            style,
            attributes,
            altitude_mode: AltitudeMode::from_code(self.altitude_mode),
            extrude: self.extrude,
            timestamp: timestamp_from_raw(self.timestamp),
            version: self.version,
        };
        ignored.strip(&mut feature);
        feature
    }
}

fn logged<T>(fid: FeatureId, field: &'static str, result: Result<T, CodecError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(target: "featuredb::codec", fid, field, error = %e, "undecodable feature field");
            None
        }
    }
}

/// Map a row selected with [`crate::sql::FEATURE_SET_COLUMNS`]
pub fn feature_set_from_row(row: &Row<'_>) -> rusqlite::Result<FeatureSet> {
    Ok(FeatureSet {
        id: row.get(0)?,
        name: row.get(1)?,
        feature_type: row.get(2)?,
        provider: row.get(3)?,
        min_lod: row.get(4)?,
        max_lod: row.get(5)?,
        visible: row.get(6)?,
        visible_check: row.get(7)?,
        lod_check: row.get(8)?,
        name_version: row.get(9)?,
        visible_version: row.get(10)?,
        lod_version: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use featuredb_core::{AttributeSet, Style};
    use geo_types::{point, Geometry};

    use crate::codec::{MsgPackStyleCodec, StyleCodec};

    fn raw(schema: &mut AttributeSchema) -> FeatureRow {
        schema.register(1, "lanes", featuredb_core::attributes::TYPE_INT);
        let mut attrs = AttributeSet::new();
        attrs.set_int("lanes", 4);
        let geometry: Geometry<f64> = point!(x: 3.0, y: 4.0).into();
        FeatureRow {
            fid: 7,
            fsid: 2,
            name: Some("Main St".to_string()),
            geometry: Some(wkb::encode(&geometry).unwrap()),
            style: Some((
                "msgpack".to_string(),
                MsgPackStyleCodec
                    .encode(&Style::Fill { color: 0xff00_00ff })
                    .unwrap(),
            )),
            attributes: Some(attributes::encode(&attrs, schema).unwrap()),
            altitude_mode: 0,
            extrude: 1.5,
            timestamp: featuredb_core::TIMESTAMP_NONE,
            version: 3,
            max_lod: 12,
            distances: vec![],
        }
    }

    #[test]
    fn test_decode_full_row() {
        let mut schema = AttributeSchema::new();
        let feature = raw(&mut schema).decode(&schema, IgnoredFields::NONE);
        assert_eq!(feature.id, 7);
        assert_eq!(feature.feature_set_id, 2);
        assert_eq!(feature.geometry, Some(point!(x: 3.0, y: 4.0).into()));
        assert_eq!(feature.style, Some(Style::Fill { color: 0xff00_00ff }));
        assert_eq!(feature.attributes.unwrap().get_int("lanes"), Some(4));
        assert_eq!(feature.timestamp, None);
        assert_eq!(feature.version, 3);
    }

    #[test]
    fn test_corrupt_attributes_leave_field_empty() {
        let mut schema = AttributeSchema::new();
        let mut row = raw(&mut schema);
        row.attributes = Some(vec![0, 0, 0, 9]);
        let feature = row.decode(&schema, IgnoredFields::NONE);
        assert!(feature.attributes.is_none());
        assert!(feature.geometry.is_some());
    }

    #[test]
    fn test_ignored_fields_are_not_decoded() {
        let mut schema = AttributeSchema::new();
        let mut row = raw(&mut schema);
        row.geometry = Some(vec![0xde, 0xad]);
        let feature = row.decode(
            &schema,
            IgnoredFields::GEOMETRY.union(IgnoredFields::NAME),
        );
        assert!(feature.geometry.is_none());
        assert!(feature.name.is_none());
        assert!(feature.style.is_some());
    }

    #[test]
    fn test_sort_key_carries_effective_lod() {
        let mut schema = AttributeSchema::new();
        let key = raw(&mut schema).sort_key();
        assert_eq!(key.id, 7);
        assert_eq!(key.max_lod, 12);
        assert_eq!(key.name.as_deref(), Some("Main St"));
    }
}
