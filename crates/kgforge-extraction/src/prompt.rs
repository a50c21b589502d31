use serde::ser::{Serialize, SerializeMap, Serializer};

use kgforge_core::document::{EntityInfo, PromptUnit, RelationSchema};
use kgforge_core::error::Result;
use kgforge_core::extraction::ChatMessage;
use kgforge_core::triple::NONE_SENTINEL;

const SYSTEM_INSTRUCTION: &str =
    "你是一名资深的三元组抽取专家，接下来我会给你一些包含实体的文本，你需要从中提取出三元组。";

/// Builds the schema-constrained instruction messages for extraction batches.
///
/// The system and user instructions are rendered once per run from the
/// relation schema; each batch only adds its own payload message.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
    user: String,
}

impl PromptBuilder {
    pub fn new(schema: &RelationSchema) -> Self {
        Self {
            system: SYSTEM_INSTRUCTION.to_string(),
            user: render_user_instruction(schema),
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system
    }

    pub fn user_instruction(&self) -> &str {
        &self.user
    }

    /// The three messages for one batch: system, user, payload.
    pub fn messages(&self, batch: &[PromptUnit]) -> Result<Vec<ChatMessage>> {
        Ok(vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
            ChatMessage::user(batch_payload(batch)?),
        ])
    }
}

/// JSON object keyed by prompt id in batch order, each value
/// `{"entity_info": [...], "content": ...}`.
pub fn batch_payload(batch: &[PromptUnit]) -> Result<String> {
    Ok(serde_json::to_string(&BatchPayload(batch))?)
}

struct BatchPayload<'a>(&'a [PromptUnit]);

#[derive(serde::Serialize)]
struct PromptBody<'a> {
    entity_info: &'a [EntityInfo],
    content: &'a str,
}

impl Serialize for BatchPayload<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for unit in self.0 {
            map.serialize_entry(
                &unit.id,
                &PromptBody {
                    entity_info: &unit.entity_info,
                    content: &unit.content,
                },
            )?;
        }
        map.end()
    }
}

fn triple_block(head: &str, relation: &str, tail: &str, start: &str, end: &str) -> String {
    format!(
        "<Triples>\n    <Triple>\n        <Head>{head}</Head>\n        <Relation>{relation}</Relation>\n        \
         <Tail>{tail}</Tail>\n        <start_node_Type>{start}</start_node_Type>\n        \
         <end_node_Type>{end}</end_node_Type>\n    </Triple>\n</Triples>\n"
    )
}

fn render_user_instruction(schema: &RelationSchema) -> String {
    let relations = schema
        .entries()
        .iter()
        .map(|r| {
            format!(
                "- 关系: {}, 起始节点类型: {}, 结束节点类型: {}",
                r.relation_name, r.start_node_type, r.end_node_type
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut text = String::new();
    text.push_str("输入数据是一个JSON对象，键为提示编号，值包含文本中出现的已知实体和文本内容，例如：\n");
    text.push_str(
        "{\n    \"Prompt_1\": {\n        \"entity_info\": [\n            {\"entity_name\": \"水利\"},\n            \
         {\"entity_name\": \"水资源\"}\n        ],\n        \"content\": \"水利是人类对自然界的水进行控制、调节、利用和保护，\
         并开发利用水资源的活动。\"\n    }\n}\n",
    );
    text.push_str("1. 你的任务是从这些文本中提取三元组，每个三元组的格式如下：\n");
    text.push_str(&triple_block("实体名", "关系", "实体名", "开始节点类型", "结束节点类型"));
    text.push_str("2. 关系、起始节点类型和结束节点类型只能从以下列表中选择，不能自定义：\n");
    text.push_str(&relations);
    text.push('\n');
    text.push_str(
        "3. 'start_node_Type' 记录头实体的类型，'end_node_Type' 记录尾实体的类型，必须与所选关系规定的起始和结束节点类型一致。\n",
    );
    text.push_str("4. 如果无法找到逻辑通顺的三元组，请输出：\n");
    text.push_str(&triple_block(
        NONE_SENTINEL,
        NONE_SENTINEL,
        NONE_SENTINEL,
        NONE_SENTINEL,
        NONE_SENTINEL,
    ));
    text.push_str("5. 头实体只能从该文本的 \"entity_info\" 中选择，尾实体可以从文本中抽取。\n");
    text.push_str("6. 你的回复只能包含XML格式的三元组，不要输出其他内容。\n");
    text.push_str("7. 示例：当输入为\n");
    text.push_str(
        "\"Prompt_4\": {\"entity_info\": [{\"entity_name\": \"大渡河\"}, {\"entity_name\": \"典型河流\"}], \
         \"content\": \"大渡河属于多开发主体的典型河流。\"}\n",
    );
    text.push_str("你的回答应类似于：\n");
    text.push_str(&triple_block("大渡河", "位于", "四川", "河流", "位置"));
    text
}
