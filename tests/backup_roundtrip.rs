use mistake_notebook::backup;
use mistake_notebook::normalizer::{self, STANDARD_ANSWER_FALLBACK};
use mistake_notebook::{QuestionRecord, RecordStore, SqliteRecordStore, Subject};
use serde_json::json;
use tempfile::TempDir;

async fn open_store(dir: &TempDir, name: &str) -> SqliteRecordStore {
    SqliteRecordStore::open(&dir.path().join(name)).await.expect("open store")
}

fn captured(subject: Subject, payload: serde_json::Value, created_at: i64) -> Vec<QuestionRecord> {
    normalizer::normalize_value(&payload)
        .expect("usable payload")
        .into_iter()
        .map(|n| QuestionRecord::from_normalized(subject, "data:image/jpeg;base64,/9j/4AAQ".to_string(), n, created_at))
        .collect()
}

#[tokio::test]
async fn export_then_import_into_empty_store_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let source = open_store(&dir, "source.db").await;

    let mut originals = Vec::new();
    originals.extend(captured(
        Subject::Math,
        json!([
            {
                "questionText": "解方程 x² - 5x + 6 = 0",
                "comparison": { "studentAnswer": "x = 2", "standardAnswer": "x = 2 或 x = 3", "gapAnalysis": "漏解" },
                "errorRoot": { "category": "Careless", "detailedReason": "没有检验第二个根" },
                "knowledgeMap": { "primaryPoint": "一元二次方程", "relatedPoints": ["因式分解"] },
                "logicEngine": { "mermaidCode": "```mermaid\ngraph TD\nA-->B\n```", "difficulty": 2, "examinerIntent": "求根完整性", "excalidrawJson": "{}" },
                "variationQuestion": "解方程 x² - 7x + 12 = 0",
                "tags": ["方程", "易错"]
            },
            { "questionText": "第二小题", "studentAnswer": "7", "knowledgePoints": ["韦达定理"] }
        ]),
        100,
    ));
    originals.extend(captured(Subject::English, json!({ "questionText": "选择正确时态", "tags": ["时态"] }), 200));

    for record in &originals {
        source.save(record).await.unwrap();
    }

    let exported = backup::export_json(&source, "mistake_notebook").await.unwrap();

    let target = open_store(&dir, "target.db").await;
    let report = backup::import_json(&target, &exported).await.unwrap();
    assert_eq!(report.imported.len(), originals.len());
    assert!(report.skipped.is_empty());

    let mut before = source.get_all().await.unwrap();
    let mut after = target.get_all().await.unwrap();
    before.sort_by_key(|r| r.created_at);
    after.sort_by_key(|r| r.created_at);
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert!(a.same_content(b), "round trip changed record:\n{a:?}\n{b:?}");
        assert!(b.id.is_some());
    }
}

#[tokio::test]
async fn legacy_and_canonical_records_import_to_canonical_shape() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, "notebook.db").await;

    let file = json!([
        {
            "id": 3,
            "subject": "Math",
            "title": "",
            "tags": ["三角"],
            "image": "data:image/png;base64,AAAA",
            "createdAt": 1_700_000_000_000_i64,
            "analysis": {
                "questionText": "在三角形中求 cos C",
                "studentAnswer": "1/2",
                "knowledgePoints": ["Trig identities", "Law of cosines"],
                "examinerIntent": "综合运用",
                "errorAnalysis": "公式记反了",
                "solution": "由余弦定理..."
            }
        },
        {
            "id": 4,
            "subject": "Physics",
            "title": "匀变速运动",
            "tags": [],
            "image": "data:image/png;base64,BBBB",
            "createdAt": 1_700_000_000_500_i64,
            "analysis": {
                "questionText": "求加速度",
                "comparison": { "studentAnswer": "2", "standardAnswer": "4", "gapAnalysis": "单位换算" },
                "isCorrect": false,
                "solution": "a = Δv/Δt",
                "errorRoot": { "category": "FormulaError", "detailedReason": "公式代错" },
                "knowledgeMap": { "primaryPoint": "匀变速运动", "relatedPoints": [] },
                "logicEngine": { "mermaidCode": "", "difficulty": 3, "examinerIntent": "" },
                "masteryLevel": "一般",
                "tags": [],
                "title": "加速度"
            }
        }
    ]);

    let report = backup::import_json(&store, &file.to_string()).await.unwrap();
    assert_eq!(report.imported.len(), 2);

    let math = store.get_by_subject(Subject::Math).await.unwrap();
    assert_eq!(math.len(), 1);
    let legacy = &math[0];
    assert_eq!(legacy.title, "Trig identities");
    assert_eq!(legacy.analysis.comparison.student_answer, "1/2");
    assert_eq!(legacy.analysis.comparison.standard_answer, STANDARD_ANSWER_FALLBACK);
    assert_eq!(legacy.analysis.knowledge_map.primary_point, "Trig identities");
    assert_eq!(legacy.analysis.knowledge_map.related_points, vec!["Law of cosines".to_string()]);
    assert_eq!(legacy.analysis.logic_engine.examiner_intent, "综合运用");
    assert_eq!(legacy.analysis.error_root.detailed_reason, "公式记反了");

    let physics = store.get_by_subject(Subject::Physics).await.unwrap();
    assert_eq!(physics.len(), 1);
    assert_eq!(physics[0].title, "匀变速运动");
    assert_eq!(physics[0].analysis.comparison.standard_answer, "4");
    assert_ne!(physics[0].id, Some(4));
}
