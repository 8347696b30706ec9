mod common;

use common::{services, write_source, RecordingChat};
use kb_rag::{
    delete_session, CancelFlag, ChatHistoryStore, ChatMessage, IndexCache, IndexPhase,
    IndexProgress, Knowledgebase, NoProgress, RagConfig, RetrievalEngine,
};
use std::collections::BTreeSet;
use std::sync::Arc;

struct Session {
    _dir: tempfile::TempDir,
    sources: std::path::PathBuf,
    knowledgebase: Knowledgebase,
    cache: IndexCache,
    history: ChatHistoryStore,
    chat: Arc<RecordingChat>,
    engine: RetrievalEngine,
}

fn open_session() -> Session {
    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig {
        data_dir: dir.path().join("data"),
        ..Default::default()
    };
    let sources = dir.path().join("sources");
    std::fs::create_dir_all(&sources).unwrap();

    let history = ChatHistoryStore::new(config.chat_sessions_path());
    let session = history.create_session(None, None).unwrap();
    let knowledgebase = Knowledgebase::open(&config.knowledgebase_dir(), &session.id).unwrap();
    let cache = IndexCache::open(&config.cache_dir()).unwrap();
    let chat = Arc::new(RecordingChat::default());
    let engine =
        RetrievalEngine::open(session.id.clone(), services(chat.clone()), cache.clone(), &config)
            .unwrap();

    Session { _dir: dir, sources, knowledgebase, cache, history, chat, engine }
}

async fn import_fruit(session: &Session) {
    for (name, content) in [("a.txt", "apples are red"), ("b.txt", "bananas are yellow")] {
        let path = write_source(&session.sources, name, content);
        session.knowledgebase.import_file(&path).unwrap();
    }
}

async fn index(session: &Session) -> kb_rag::IndexReport {
    session
        .engine
        .index_knowledgebase(&session.knowledgebase, &NoProgress, &CancelFlag::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_answer_cites_only_relevant_file() {
    let session = open_session();
    import_fruit(&session).await;

    let report = index(&session).await;
    assert_eq!(report.added, 2);
    assert!(report.persisted);

    let response = session.engine.query("what color are apples").await.unwrap();
    assert_eq!(response.answer_text, "Apples are red.");
    assert_eq!(response.source_file_names, BTreeSet::from(["a.txt".to_string()]));

    let requests = session.chat.requests.lock().unwrap();
    let outgoing = requests[0].last().unwrap().text();
    assert!(outgoing.starts_with("Relevant context:\n\napples are red"));
    assert!(!outgoing.contains("bananas"));
}

#[tokio::test]
async fn test_answers_are_stored_with_sources() {
    let session = open_session();
    import_fruit(&session).await;
    index(&session).await;

    let session_id = session.engine.session_id().to_string();
    let question = "what color are apples";
    session
        .history
        .add_message(&session_id, ChatMessage::new(kb_rag::chat_sessions::USER_ROLE, question, None))
        .unwrap();
    let response = session.engine.query(question).await.unwrap();
    session.history.add_message(&session_id, response.to_message()).unwrap();

    let stored = session.history.session(&session_id).unwrap().unwrap();
    assert_eq!(stored.title, "What color are apples");
    assert_eq!(stored.messages[1].sources.as_deref(), Some("a.txt"));

    // a fresh engine picks the conversation back up
    let config = RagConfig::default();
    let reopened = RetrievalEngine::open(
        session_id.clone(),
        services(Arc::new(RecordingChat::default())),
        session.cache.clone(),
        &config,
    )
    .unwrap();
    reopened.restore_history(&stored.messages).await;
    assert_eq!(reopened.history().await.len(), 3);
    assert_eq!(reopened.indexed_file_count().await, 2);
}

#[tokio::test]
async fn test_second_run_without_changes_does_nothing() {
    let session = open_session();
    import_fruit(&session).await;
    index(&session).await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<IndexProgress>();
    let report = session
        .engine
        .index_knowledgebase(&session.knowledgebase, &tx, &CancelFlag::new())
        .await
        .unwrap();
    drop(tx);

    assert_eq!(report, kb_rag::IndexReport::default());
    let mut last = None;
    while let Some(event) = rx.recv().await {
        assert_ne!(event.phase, IndexPhase::Persisting);
        last = Some(event);
    }
    assert_eq!(last.unwrap().message, "All files already indexed");
}

#[tokio::test]
async fn test_deleted_resource_leaves_index() {
    let session = open_session();
    import_fruit(&session).await;
    index(&session).await;

    assert!(session.knowledgebase.delete_file("a.txt").unwrap());
    let report = index(&session).await;
    assert_eq!(report.deleted, 1);
    assert_eq!(session.engine.indexed_file_count().await, 1);

    let response = session.engine.query("what color are apples").await.unwrap();
    assert!(!response.has_sources());
}

#[tokio::test]
async fn test_cancelled_run_indexes_nothing() {
    let session = open_session();
    import_fruit(&session).await;

    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = session
        .engine
        .index_knowledgebase(&session.knowledgebase, &NoProgress, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, kb_rag::RagError::Cancelled));
    assert_eq!(session.engine.segment_count().await, 0);
    assert!(!session.cache.contains(session.engine.session_id()).unwrap());
}

#[tokio::test]
async fn test_delete_session_removes_everything() {
    let session = open_session();
    import_fruit(&session).await;
    index(&session).await;
    let session_id = session.engine.session_id().to_string();

    delete_session(&session_id, &session.history, &session.knowledgebase, &session.cache).unwrap();

    assert!(!session.cache.contains(&session_id).unwrap());
    assert!(!session.knowledgebase.dir().exists());
    assert!(session.history.session(&session_id).unwrap().is_none());
}
