//! Tests for the XML element wrapper.

use std::collections::BTreeMap;

use wfa_share::element::{Element, ElementEntry, ElementValue, SerializeOptions};
use wfa_share::WfaError;

mod build {
    use super::*;

    #[test]
    fn test_build_node() {
        let node = Element::build_node("volume", &[("name", "vol1"), ("size", "")]);
        assert_eq!(node.to_string(), "<volume><name>vol1</name><size/></volume>");
    }

    #[test]
    fn test_add_attributes_replaces_existing() {
        let mut entry = Element::new("userInputEntry");
        entry.add_attributes([("key", "volName"), ("value", "a")]);
        entry.add_attribute("value", "b");

        assert!(entry.has_attribute("key"));
        assert_eq!(entry.attribute("value"), Some("b"));
        assert_eq!(entry.attribute_names().collect::<Vec<_>>(), vec!["key", "value"]);
    }

    #[test]
    fn test_add_new_child_converts_entities() {
        let mut root = Element::new("root");
        root.add_new_child("raw", "&lt;b&gt;", false);
        root.add_new_child("converted", "&lt;b&gt;", true);

        assert_eq!(root.child_content("raw"), Some("&lt;b&gt;"));
        assert_eq!(root.child_content("converted"), Some("<b>"));
        // Special characters are escaped again on output.
        assert!(root.to_string().contains("<converted>&lt;b&gt;</converted>"));
    }

    #[test]
    fn test_add_node_with_children() {
        let mut root = Element::new("root");
        root.add_node_with_children("pair", &[("k", "v")]);
        assert_eq!(root.children().len(), 1);
        assert_eq!(
            root.find_child_by_tag_name("pair").unwrap().child_content("k"),
            Some("v")
        );
    }
}

mod dict_access {
    use super::*;

    #[test]
    fn test_set_map_round_trip() {
        let mut root = Element::new("root");
        let mut value = BTreeMap::new();
        value.insert("a".to_string(), "1".to_string());
        value.insert("b".to_string(), "2".to_string());
        root.set("k", value).unwrap();

        let xml = root.serialize(&SerializeOptions::default()).unwrap();
        let parsed = Element::parse(&xml).unwrap();

        let node = parsed.get("k").unwrap().as_node().unwrap();
        assert_eq!(node.get("a").unwrap(), ElementEntry::Text("1"));
        assert_eq!(node.get("b").unwrap(), ElementEntry::Text("2"));
    }

    #[test]
    fn test_set_scalars() {
        let mut root = Element::new("root");
        root.set("size", 100u64).unwrap();
        root.set("name", "vol1").unwrap();
        root.set("none", None::<String>).unwrap();

        assert_eq!(
            root.to_string(),
            "<root><size>100</size><name>vol1</name><none/></root>"
        );
        assert_eq!(root.get("none").unwrap().as_text(), Some(""));
    }

    #[test]
    fn test_set_node() {
        let mut root = Element::new("root");
        root.set("wrapper", Element::build_node("inner", &[("x", "1")]))
            .unwrap();
        assert_eq!(
            root.to_string(),
            "<root><wrapper><inner><x>1</x></inner></wrapper></root>"
        );
    }

    #[test]
    fn test_set_list_of_maps() {
        let mut root = Element::new("root");
        root.set(
            "entries",
            ElementValue::list([
                ElementValue::map([("key", "a")]),
                ElementValue::map([("key", "b")]),
            ]),
        )
        .unwrap();
        assert_eq!(
            root.to_string(),
            "<root><entries><key>a</key><key>b</key></entries></root>"
        );
    }

    #[test]
    fn test_translate_struct_errors() {
        let mut root = Element::new("root");
        assert!(matches!(
            root.translate_struct(ElementValue::Text("x".to_string())),
            Err(WfaError::UnsupportedType(_))
        ));
        assert!(matches!(
            root.translate_struct(ElementValue::map([("", "x")])),
            Err(WfaError::InvalidKey)
        ));
    }

    #[test]
    fn test_get_missing() {
        let root = Element::parse("<root/>").unwrap();
        let err = root.get("nothing").unwrap_err();
        assert_eq!(err.to_string(), "No element by given name nothing.");
    }
}

mod parse_and_serialize {
    use super::*;

    #[test]
    fn test_parse_job_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<job xmlns:atom="http://www.w3.org/2005/Atom" jobId="909">
  <jobStatus>
    <jobStatus>COMPLETED</jobStatus>
    <returnParameters>
      <returnParameters key="export_location" value="host:/vol/x"/>
    </returnParameters>
  </jobStatus>
  <atom:link rel="self" href="http://wfa/rest/workflows/u/jobs/909"/>
</job>"#;

        let job = Element::parse(xml).unwrap();
        assert_eq!(job.name(), "job");
        assert_eq!(job.attribute("jobId"), Some("909"));
        assert_eq!(job.children().len(), 2);

        let status = job.find_child_by_tag_name("jobStatus").unwrap();
        assert_eq!(status.child_content("jobStatus"), Some("COMPLETED"));
        let params = status.find_child_by_tag_name("returnParameters").unwrap();
        assert_eq!(params.children()[0].attribute("value"), Some("host:/vol/x"));
    }

    #[test]
    fn test_cdata_content() {
        let root = Element::parse("<m><![CDATA[a < b]]></m>").unwrap();
        assert_eq!(root.content(), Some("a < b"));
    }

    #[test]
    fn test_multiple_roots_rejected() {
        assert!(matches!(
            Element::parse("<a/><b/>"),
            Err(WfaError::Xml(_))
        ));
    }

    #[test]
    fn test_standalone_declaration() {
        let root = Element::build_node("workflowInput", &[("comments", "c")]);
        let xml = root.serialize(&SerializeOptions::standalone()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <workflowInput><comments>c</comments></workflowInput>"
        );
    }

    #[test]
    fn test_pretty_output_parses_back() {
        let mut root = Element::new("root");
        root.add_attribute("id", "a&b");
        root.add_node_with_children("child", &[("x", "1"), ("y", "2")]);

        let pretty = root
            .serialize(&SerializeOptions {
                pretty: true,
                ..SerializeOptions::default()
            })
            .unwrap();
        assert!(pretty.contains('\n'));

        let parsed = Element::parse(&pretty).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn test_set_content_escaped() {
        let mut root = Element::new("msg");
        root.set_content("1 < 2 & 3 > 2");
        let parsed = Element::parse(&root.to_string()).unwrap();
        assert_eq!(parsed.content(), Some("1 < 2 & 3 > 2"));
    }
}
