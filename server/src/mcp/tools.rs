//! MCP Tool Definitions
//!
//! One tool per memory operation. Tool names are the operation names, so
//! `tools/call` forwards them to the service unchanged.

use super::protocol::{PropertySchema, Tool, ToolInputSchema};
use kg_memory::Operation;
use std::collections::HashMap;

/// Get all available memory tools
pub fn get_all_tools() -> Vec<Tool> {
    Operation::ALL.iter().map(|op| tool_for(*op)).collect()
}

/// Tool definition for one operation
pub fn tool_for(operation: Operation) -> Tool {
    match operation {
        Operation::SetEntity => set_entity_tool(),
        Operation::SetRelationship => set_relationship_tool(),
        Operation::SearchEntity => search_entity_tool(),
        Operation::GetEntity => get_entity_tool(),
        Operation::MemoryStats => memory_stats_tool(),
    }
}

// Helper to create property schema
fn string_prop(description: &str) -> PropertySchema {
    PropertySchema {
        property_type: "string".to_string(),
        description: Some(description.to_string()),
        items: None,
        minimum: None,
    }
}

fn id_prop(description: &str) -> PropertySchema {
    PropertySchema {
        property_type: "integer".to_string(),
        description: Some(description.to_string()),
        items: None,
        minimum: Some(1.0),
    }
}

fn array_prop(description: &str, item_type: &str) -> PropertySchema {
    PropertySchema {
        property_type: "array".to_string(),
        description: Some(description.to_string()),
        items: Some(Box::new(PropertySchema {
            property_type: item_type.to_string(),
            description: None,
            items: None,
            minimum: None,
        })),
        minimum: None,
    }
}

fn object_schema(properties: HashMap<String, PropertySchema>, required: &[&str]) -> ToolInputSchema {
    ToolInputSchema {
        schema_type: "object".to_string(),
        properties: Some(properties),
        required: if required.is_empty() {
            None
        } else {
            Some(required.iter().map(|s| s.to_string()).collect())
        },
    }
}

fn set_entity_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert(
        "name".to_string(),
        string_prop("Entity name. Names are unique and case-sensitive"),
    );
    properties.insert(
        "entity_type".to_string(),
        string_prop("Entity category, e.g. person, project, preference"),
    );
    properties.insert(
        "content".to_string(),
        array_prop(
            "Facts to record. Appended to any facts the entity already has",
            "string",
        ),
    );

    Tool {
        name: Operation::SetEntity.name().to_string(),
        description: Some("Creates an entity or appends facts to an existing one with the same name. USE WHEN: learning something worth remembering about a person, project or topic.".to_string()),
        input_schema: object_schema(properties, &["name", "entity_type", "content"]),
    }
}

fn set_relationship_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert(
        "source_entity_id".to_string(),
        id_prop("Id of the entity the relation starts from"),
    );
    properties.insert(
        "target_entity_id".to_string(),
        id_prop("Id of the entity the relation points to"),
    );
    properties.insert(
        "relation_type".to_string(),
        string_prop("Relation label, e.g. works_on, knows, prefers"),
    );

    Tool {
        name: Operation::SetRelationship.name().to_string(),
        description: Some("Links two existing entities with a directed, typed relation. USE WHEN: two remembered entities are related. Both ids must exist.".to_string()),
        input_schema: object_schema(
            properties,
            &["source_entity_id", "target_entity_id", "relation_type"],
        ),
    }
}

fn search_entity_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert(
        "query".to_string(),
        string_prop("Natural language description of what to recall"),
    );

    Tool {
        name: Operation::SearchEntity.name().to_string(),
        description: Some("Finds the entities closest in meaning to the query plus the entities directly related to them. USE WHEN: recalling what is known before answering.".to_string()),
        input_schema: object_schema(properties, &["query"]),
    }
}

fn get_entity_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("name".to_string(), string_prop("Exact entity name"));

    Tool {
        name: Operation::GetEntity.name().to_string(),
        description: Some("Retrieves one entity by exact name. USE WHEN: you know the name and need its full fact list.".to_string()),
        input_schema: object_schema(properties, &["name"]),
    }
}

fn memory_stats_tool() -> Tool {
    Tool {
        name: Operation::MemoryStats.name().to_string(),
        description: Some("Reports entity and relation counts and the embedding model in use.".to_string()),
        input_schema: object_schema(HashMap::new(), &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_all_tools_count() {
        let tools = get_all_tools();
        assert_eq!(tools.len(), 5, "Expected 5 tools, got {}", tools.len());
    }

    #[test]
    fn test_tools_have_required_fields() {
        for tool in get_all_tools() {
            assert!(!tool.name.is_empty(), "Tool name should not be empty");
            assert!(
                tool.description.is_some(),
                "Tool {} should have description",
                tool.name
            );
        }
    }

    #[test]
    fn test_tool_names_are_operations() {
        for tool in get_all_tools() {
            assert!(
                tool.name.parse::<Operation>().is_ok(),
                "Tool {} has no matching operation",
                tool.name
            );
        }
    }

    #[test]
    fn test_id_properties_serialize_minimum() {
        let tool = serde_json::to_value(tool_for(Operation::SetRelationship)).unwrap();
        let source = &tool["inputSchema"]["properties"]["source_entity_id"];
        assert_eq!(source["type"], "integer");
        assert_eq!(source["minimum"], 1.0);
        for unused in ["default", "enum", "maximum"] {
            assert!(source.get(unused).is_none(), "unexpected {}", unused);
        }

        let set_entity = serde_json::to_value(tool_for(Operation::SetEntity)).unwrap();
        let content = &set_entity["inputSchema"]["properties"]["content"];
        assert_eq!(content["items"]["type"], "string");
        assert!(content["items"].get("minimum").is_none());
    }

    #[test]
    fn test_required_fields_exist_in_properties() {
        for tool in get_all_tools() {
            let properties = tool.input_schema.properties.unwrap_or_default();
            for field in tool.input_schema.required.unwrap_or_default() {
                assert!(
                    properties.contains_key(&field),
                    "{} requires undeclared {}",
                    tool.name,
                    field
                );
            }
        }
    }
}
