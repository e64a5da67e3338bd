use super::*;
use gisstream_core::{FieldType, Geometry, ScreenUnit};

const KML_OPEN: &str = r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">"#;

fn wrap(body: &str) -> String {
    format!("{KML_OPEN}{body}</kml>")
}

fn decode(kml: &str) -> Vec<GisObject> {
    KmlDecoder::new(kml.as_bytes())
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap()
}

fn kinds(objects: &[GisObject]) -> Vec<&'static str> {
    objects.iter().map(GisObject::kind).collect()
}

fn only_feature(kml: &str) -> Feature {
    let mut features = decode(kml).into_iter().filter_map(|o| match o {
        GisObject::Feature(f) => Some(f),
        _ => None,
    });
    let feature = features.next().expect("no feature decoded");
    assert!(features.next().is_none(), "more than one feature decoded");
    feature
}

#[test]
fn test_document_start_header() {
    let kml = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2" xmlns:atom="http://www.w3.org/2005/Atom">
  <Placemark/>
</kml>"#;
    let mut decoder = KmlDecoder::new(kml.as_bytes()).unwrap();
    assert_eq!(decoder.encoding(), "ISO-8859-1");
    let Some(GisObject::DocumentStart(start)) = decoder.read().unwrap() else {
        panic!("expected DocumentStart");
    };
    assert_eq!(start.encoding, "ISO-8859-1");
    let prefixes: Vec<&str> = start.namespaces.iter().map(|n| n.prefix.as_str()).collect();
    assert_eq!(prefixes, ["gx", "atom"]);
    assert!(matches!(decoder.read().unwrap(), Some(GisObject::Feature(_))));
    assert!(decoder.read().unwrap().is_none());
    assert!(decoder.read().unwrap().is_none());
}

#[test]
fn test_default_encoding() {
    let binding = wrap("");
    let decoder = KmlDecoder::new(binding.as_bytes()).unwrap();
    assert_eq!(decoder.encoding(), "UTF-8");
    assert_eq!(kinds(&decode(&wrap(""))), ["DocumentStart"]);
}

#[test]
fn test_containers_are_balanced() {
    let objects = decode(&wrap(
        r#"<Document id="d">
             <name>Doc</name>
             <open>1</open>
             <Style id="s"><LineStyle><width>3</width></LineStyle></Style>
             <Folder>
               <name>F</name>
               <Placemark><name>P</name></Placemark>
             </Folder>
             <Placemark/>
           </Document>"#,
    ));
    assert_eq!(
        kinds(&objects),
        [
            "DocumentStart",
            "ContainerStart",
            "ContainerStart",
            "Placemark",
            "ContainerEnd",
            "Placemark",
            "ContainerEnd",
        ]
    );
    let GisObject::ContainerStart(doc) = &objects[1] else {
        panic!("expected Document");
    };
    assert_eq!(doc.kind, ContainerKind::Document);
    assert_eq!(doc.common.id.as_deref(), Some("d"));
    assert_eq!(doc.common.name.as_deref(), Some("Doc"));
    assert!(doc.open);
    assert_eq!(doc.styles.len(), 1);
    assert_eq!(doc.styles[0].id(), Some("s"));

    let GisObject::ContainerStart(folder) = &objects[2] else {
        panic!("expected Folder");
    };
    assert_eq!(folder.kind, ContainerKind::Folder);
    assert_eq!(folder.common.name.as_deref(), Some("F"));
}

#[test]
fn test_schema_alias() {
    let objects = decode(&wrap(
        r##"<Document>
             <Schema name="Tower" parent="Placemark" id="t">
               <SimpleField name="height" type="double"><displayName>Height</displayName></SimpleField>
               <SimpleField type="int"/>
               <SimpleField name="owner" type="blob"/>
             </Schema>
             <Tower>
               <name>T1</name>
               <ExtendedData>
                 <SchemaData schemaUrl="#t"><SimpleData name="height">30</SimpleData></SchemaData>
               </ExtendedData>
             </Tower>
           </Document>"##,
    ));
    assert_eq!(
        kinds(&objects),
        ["DocumentStart", "ContainerStart", "Schema", "Placemark", "ContainerEnd"]
    );

    let GisObject::Schema(schema) = &objects[2] else {
        panic!("expected Schema");
    };
    assert_eq!(schema.id.as_deref(), Some("t"));
    assert_eq!(schema.name.as_deref(), Some("Tower"));
    assert_eq!(schema.parent.as_deref(), Some("Placemark"));
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["height", "gen0", "owner"]);
    let height = schema.get("height").unwrap();
    assert_eq!(height.field_type, FieldType::Double);
    assert_eq!(height.display_name.as_deref(), Some("Height"));
    assert_eq!(schema.get("gen0").unwrap().field_type, FieldType::Int);
    assert_eq!(schema.get("owner").unwrap().field_type, FieldType::String);

    let GisObject::Feature(tower) = &objects[3] else {
        panic!("expected aliased Placemark");
    };
    assert_eq!(tower.common.name.as_deref(), Some("T1"));
    assert_eq!(tower.common.schema.as_deref(), Some("#t"));
    assert_eq!(tower.common.get_data("height"), Some("30"));
    let (field, _) = &tower.common.data[0];
    assert_eq!(field.field_type, FieldType::Double);
}

#[test]
fn test_style_map_first_pair_wins() {
    let objects = decode(&wrap(
        r##"<StyleMap id="m">
             <Pair><key>normal</key><styleUrl>#a</styleUrl></Pair>
             <Pair><key>NORMAL</key><styleUrl>#b</styleUrl></Pair>
             <Pair><key>highlight</key><Style><IconStyle><scale>2</scale></IconStyle></Style></Pair>
             <Pair></Pair>
           </StyleMap>"##,
    ));
    let GisObject::StyleMap(map) = &objects[1] else {
        panic!("expected StyleMap");
    };
    assert_eq!(map.id.as_deref(), Some("m"));
    assert_eq!(map.pairs().len(), 2);
    assert_eq!(map.get("normal").unwrap().style_url.as_deref(), Some("#a"));
    let highlight = map.get("highlight").unwrap();
    assert!(highlight.style_url.is_none());
    let icon = highlight.style.as_ref().unwrap().icon.as_ref().unwrap();
    assert_eq!(icon.scale, Some(2.0));
}

#[test]
fn test_last_schema_data_wins() {
    let feature = only_feature(&wrap(
        r##"<Placemark>
             <ExtendedData>
               <Data name="plain"><displayName>Plain</displayName><value>1</value></Data>
               <SchemaData schemaUrl="#a"><SimpleData name="x">first</SimpleData></SchemaData>
               <SchemaData schemaUrl="#b"><SimpleData name="y">second</SimpleData></SchemaData>
               <Data><value>nameless</value></Data>
             </ExtendedData>
           </Placemark>"##,
    ));
    assert_eq!(feature.common.schema.as_deref(), Some("#b"));
    assert_eq!(feature.common.get_data("plain"), Some("1"));
    assert_eq!(feature.common.get_data("x"), Some("first"));
    assert_eq!(feature.common.get_data("y"), Some("second"));
    assert_eq!(feature.common.data.len(), 3);
}

#[test]
fn test_foreign_extended_data() {
    let kml = r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:my="urn:example:data">
      <Placemark>
        <ExtendedData><my:rating stars="4">good</my:rating></ExtendedData>
      </Placemark>
    </kml>"#;
    let feature = only_feature(kml);
    assert_eq!(feature.common.extended_elements.len(), 1);
    let rating = &feature.common.extended_elements[0];
    assert_eq!(rating.name, "rating");
    assert_eq!(rating.namespace_uri(), Some("urn:example:data"));
    assert_eq!(rating.attribute("stars"), Some("4"));
    assert_eq!(rating.text.as_deref(), Some("good"));
}

#[test]
fn test_look_at_google_extensions() {
    let feature = only_feature(&wrap(
        r#"<Placemark>
             <LookAt>
               <longitude>12.5</longitude>
               <gx:TimeStamp><when>2020-05-01T00:00:00Z</when></gx:TimeStamp>
               <gx:altitudeMode>relativeToSeaFloor</gx:altitudeMode>
               <range>100</range>
             </LookAt>
           </Placemark>"#,
    ));
    let view = &feature.common.view_group;
    assert_eq!(view.tag(), "LookAt");
    assert_eq!(view.get_f64("longitude"), Some(12.5));
    assert_eq!(view.get("range"), Some("100"));
    assert_eq!(view.get("gx:TimeStamp/when"), Some("2020-05-01T00:00:00Z"));
    assert_eq!(view.get("altitudeMode"), Some("relativeToSeaFloor"));
    assert!(!view.contains_key("gx:altitudeMode"));
}

#[test]
fn test_kml_altitude_mode_beats_google_extension() {
    let feature = only_feature(&wrap(
        r#"<Placemark>
             <Camera>
               <altitudeMode>absolute</altitudeMode>
               <gx:altitudeMode>clampToSeaFloor</gx:altitudeMode>
             </Camera>
           </Placemark>"#,
    ));
    assert_eq!(feature.common.view_group.tag(), "Camera");
    assert_eq!(feature.common.view_group.get("altitudeMode"), Some("absolute"));
}

#[test]
fn test_region_and_time() {
    let feature = only_feature(&wrap(
        r#"<Placemark>
             <TimeSpan><begin>2020-01-01T00:00:00Z</begin></TimeSpan>
             <Region>
               <LatLonAltBox><north>10</north><south>0</south><east>5</east><west>-5</west></LatLonAltBox>
               <Lod><minLodPixels>128</minLodPixels></Lod>
             </Region>
           </Placemark>"#,
    ));
    assert!(feature.common.start_time.is_some());
    assert!(feature.common.end_time.is_none());
    let region = &feature.common.region;
    assert_eq!(region.tag(), "Region");
    assert_eq!(region.get_f64("north"), Some(10.0));
    assert_eq!(region.get_f64("west"), Some(-5.0));
    assert_eq!(region.get("minLodPixels"), Some("128"));
}

#[test]
fn test_time_stamp_sets_both_bounds() {
    let feature = only_feature(&wrap(
        r#"<Placemark><gx:TimeStamp><when>2021-06-01T12:00:00Z</when></gx:TimeStamp></Placemark>"#,
    ));
    assert!(feature.common.start_time.is_some());
    assert_eq!(feature.common.start_time, feature.common.end_time);
}

#[test]
fn test_network_link() {
    let feature = only_feature(&wrap(
        r#"<NetworkLink>
             <open>1</open>
             <refreshVisibility>1</refreshVisibility>
             <Link><href>sub.kml</href><viewFormat/></Link>
           </NetworkLink>"#,
    ));
    let link = feature.network_link().unwrap();
    assert!(link.open);
    assert!(link.refresh_visibility);
    assert!(!link.fly_to_view);
    assert_eq!(link.link.get("href"), Some("sub.kml"));
    assert_eq!(link.link.get("viewFormat"), Some(""));
}

#[test]
fn test_ground_overlay() {
    let feature = only_feature(&wrap(
        r#"<GroundOverlay>
             <color>7fffffff</color>
             <drawOrder>2</drawOrder>
             <Icon><href>map.png</href></Icon>
             <LatLonBox><north>10</north><south>0</south><east>-170</east><west>-190</west></LatLonBox>
             <altitude>5</altitude>
           </GroundOverlay>"#,
    ));
    let overlay = feature.overlay().unwrap();
    assert_eq!(overlay.draw_order, Some(2));
    assert!(overlay.color.is_some());
    assert_eq!(overlay.icon.get("href"), Some("map.png"));
    let FeatureKind::GroundOverlay(ground) = &feature.kind else {
        panic!("expected GroundOverlay");
    };
    assert_eq!(ground.north, Some(10.0));
    assert_eq!(ground.west, Some(170.0));
    assert_eq!(ground.altitude, Some(5.0));
}

#[test]
fn test_screen_overlay() {
    let feature = only_feature(&wrap(
        r#"<ScreenOverlay>
             <overlayXY x="0.5" y="1" xunits="fraction" yunits="pixels"/>
             <screenXY x="10" y="10" xunits="insetPixels" yunits="insetPixels"/>
             <size x="abc" y="0"/>
             <rotation>270</rotation>
           </ScreenOverlay>"#,
    ));
    let FeatureKind::ScreenOverlay(screen) = &feature.kind else {
        panic!("expected ScreenOverlay");
    };
    let overlay_xy = screen.overlay_xy.unwrap();
    assert_eq!(overlay_xy.x, 0.5);
    assert_eq!(overlay_xy.yunits, ScreenUnit::Pixels);
    assert_eq!(screen.screen_xy.unwrap().xunits, ScreenUnit::InsetPixels);
    assert!(screen.size.is_none());
    assert_eq!(screen.rotation, Some(-90.0));
}

#[test]
fn test_photo_overlay() {
    let feature = only_feature(&wrap(
        r#"<PhotoOverlay>
             <rotation>200</rotation>
             <Point><coordinates>1,2</coordinates></Point>
           </PhotoOverlay>"#,
    ));
    let FeatureKind::PhotoOverlay(photo) = &feature.kind else {
        panic!("expected PhotoOverlay");
    };
    assert!(photo.rotation.is_none());
    assert!(matches!(feature.geometry, Some(Geometry::Point(_))));
}

#[test]
fn test_bad_polygon_keeps_feature() {
    let feature = only_feature(&wrap(
        r#"<Placemark>
             <name>Bad</name>
             <Polygon>
               <outerBoundaryIs><LinearRing><coordinates>0,0 1,1</coordinates></LinearRing></outerBoundaryIs>
             </Polygon>
             <description>after</description>
           </Placemark>"#,
    ));
    assert_eq!(feature.common.name.as_deref(), Some("Bad"));
    assert!(feature.geometry.is_none());
    assert_eq!(feature.common.description.as_deref(), Some("after"));
}

#[test]
fn test_inline_style_and_properties() {
    let feature = only_feature(&wrap(
        r##"<Placemark id="p1">
             <visibility>0</visibility>
             <styleUrl>#shared</styleUrl>
             <Snippet maxLines="2"></Snippet>
             <address>1 Main St</address>
             <Style><PolyStyle><color>ff0000ff</color><fill>0</fill></PolyStyle></Style>
             <Point><coordinates>-122.08,37.42,10</coordinates></Point>
           </Placemark>"##,
    ));
    assert_eq!(feature.common.id.as_deref(), Some("p1"));
    assert_eq!(feature.common.visibility, Some(false));
    assert_eq!(feature.common.style_url.as_deref(), Some("#shared"));
    assert_eq!(feature.common.snippet.as_deref(), Some(""));
    assert_eq!(feature.common.elements.len(), 1);
    assert_eq!(feature.common.elements[0].name, "address");
    let Some(StyleSelector::Style(style)) = &feature.style else {
        panic!("expected inline Style");
    };
    assert_eq!(style.poly.as_ref().unwrap().fill, Some(false));
    let Some(Geometry::Point(point)) = &feature.geometry else {
        panic!("expected Point");
    };
    assert_eq!(point.coord.alt, Some(10.0));
}

#[test]
fn test_foreign_elements() {
    let kml = r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:atom="http://www.w3.org/2005/Atom">
      <Document>
        <atom:author><atom:name>Me</atom:name></atom:author>
        <Placemark/>
        <ext:note xmlns:ext="urn:example:ext" level="2">text</ext:note>
      </Document>
    </kml>"#;
    let objects = decode(kml);
    assert_eq!(
        kinds(&objects),
        ["DocumentStart", "ContainerStart", "Placemark", "Element", "ContainerEnd"]
    );
    let GisObject::ContainerStart(doc) = &objects[1] else {
        panic!("expected Document");
    };
    assert_eq!(doc.common.elements.len(), 1);
    let author = &doc.common.elements[0];
    assert_eq!(author.name, "author");
    assert_eq!(author.child("name").unwrap().text.as_deref(), Some("Me"));

    let GisObject::Element(note) = &objects[3] else {
        panic!("expected Element");
    };
    assert_eq!(note.name, "note");
    assert_eq!(note.namespace_uri(), Some("urn:example:ext"));
    assert_eq!(note.attribute("level"), Some("2"));
}

#[test]
fn test_out_of_order_style() {
    let objects = decode(&wrap(
        r#"<Document><Placemark/><Style id="late"/><Folder/></Document>"#,
    ));
    assert_eq!(
        kinds(&objects),
        [
            "DocumentStart",
            "ContainerStart",
            "Placemark",
            "Style",
            "ContainerStart",
            "ContainerEnd",
            "ContainerEnd",
        ]
    );
    let GisObject::Style(style) = &objects[3] else {
        panic!("expected Style");
    };
    assert_eq!(style.id.as_deref(), Some("late"));
}

#[test]
fn test_unknown_kml_elements_are_transparent() {
    let objects = decode(&wrap(
        r#"<Wrapper><Placemark><name>inner</name></Placemark></Wrapper>"#,
    ));
    assert_eq!(kinds(&objects), ["DocumentStart", "Placemark"]);
}

#[test]
fn test_root_feature_without_kml_wrapper() {
    let kml = r#"<Placemark xmlns="http://www.opengis.net/kml/2.2"><name>x</name></Placemark>"#;
    let objects = decode(kml);
    assert_eq!(kinds(&objects), ["DocumentStart", "Placemark"]);
}

#[test]
fn test_network_link_control() {
    let objects = decode(&wrap(
        r#"<NetworkLinkControl>
             <minRefreshPeriod>30</minRefreshPeriod>
             <cookie>a=b</cookie>
             <linkName>Live</linkName>
             <expires>2030-01-01T00:00:00Z</expires>
             <LookAt><range>500</range></LookAt>
             <Update>
               <targetHref>http://example.com/base.kml</targetHref>
               <Change><Placemark targetId="p"><name>new</name></Placemark></Change>
             </Update>
           </NetworkLinkControl>
           <Document/>"#,
    ));
    assert_eq!(
        kinds(&objects),
        ["DocumentStart", "NetworkLinkControl", "ContainerStart", "ContainerEnd"]
    );
    let GisObject::NetworkLinkControl(control) = &objects[1] else {
        panic!("expected NetworkLinkControl");
    };
    assert_eq!(control.min_refresh_period, Some(30.0));
    assert_eq!(control.cookie.as_deref(), Some("a=b"));
    assert_eq!(control.link_name.as_deref(), Some("Live"));
    assert!(control.expires.is_some());
    assert_eq!(control.view_group.get("range"), Some("500"));
    assert_eq!(
        control.target_href.as_deref(),
        Some("http://example.com/base.kml")
    );
    assert_eq!(control.update_type.as_deref(), Some("Change"));
}

#[test]
fn test_truncated_input() {
    let kml = format!("{KML_OPEN}<Document><Placemark><name>x</name>");
    let mut decoder = KmlDecoder::new(kml.as_bytes()).unwrap();
    let mut failed = false;
    for _ in 0..10 {
        match decoder.read() {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                failed = true;
                break;
            }
        }
    }
    assert!(failed);
    assert!(decoder.read().unwrap().is_none());
}

#[test]
fn test_invalid_values_are_ignored() {
    let feature = only_feature(&wrap(
        r#"<Placemark>
             <visibility>maybe</visibility>
             <Style><LineStyle><color>nothex</color><width>wide</width></LineStyle></Style>
           </Placemark>"#,
    ));
    assert!(feature.common.visibility.is_none());
    let Some(StyleSelector::Style(style)) = &feature.style else {
        panic!("expected inline Style");
    };
    let line = style.line.as_ref().unwrap();
    assert_eq!(line.color, Color::WHITE);
    assert_eq!(line.width, 1.0);
}
