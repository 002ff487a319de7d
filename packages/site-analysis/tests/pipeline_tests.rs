//! End-to-end tests for the analysis pipeline over the in-memory store.

use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use site_analysis::executors::{ContactExtractor, KeywordClassifier};
use site_analysis::testing::{memory_service, MockExecutor};
use site_analysis::{
    AnalysisConfig, AnalysisError, AnalysisOutcome, AnalysisRequest, AnalysisService,
    ExecutorSet, MemoryStore, RatePolicy, SubjectStore, TaskId, TaskRecord, TaskState, WorkKind,
};

const NEWS_PAGE: &str = "<html><body><h1>Breaking news</h1><p>Headlines and politics from our reporter.</p></body></html>";

fn dispatched(outcome: AnalysisOutcome) -> TaskRecord {
    match outcome {
        AnalysisOutcome::Dispatched { task, .. } => task,
        other => panic!("expected dispatch, got {:?}", other),
    }
}

async fn wait_terminal(service: &AnalysisService<MemoryStore>, task_id: TaskId) -> TaskRecord {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let record = service.task(task_id).await.unwrap();
        if record.is_terminal() {
            return record;
        }
        assert!(Instant::now() < deadline, "task {} never finished", task_id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn mock_service(mock: Arc<MockExecutor>) -> (AnalysisService<MemoryStore>, Arc<MemoryStore>) {
    memory_service(ExecutorSet::uniform(mock), AnalysisConfig::default())
}

#[tokio::test]
async fn test_classification_goes_pending_then_success() {
    let mock = Arc::new(
        MockExecutor::new()
            .returning(json!({"category": "News"}))
            .with_latch(),
    );
    let (service, store) = mock_service(mock.clone());

    let task = dispatched(
        service
            .analyze(
                WorkKind::Classification,
                AnalysisRequest::new("http://news.test").with_html(NEWS_PAGE),
            )
            .await
            .unwrap(),
    );
    assert_eq!(task.state, TaskState::Pending);
    assert_eq!(service.task(task.task_id).await.unwrap().state, TaskState::Pending);

    mock.release();
    let finished = wait_terminal(&service, task.task_id).await;
    assert_eq!(finished.state, TaskState::Success);
    assert_eq!(finished.result, Some(json!({"category": "News"})));

    // Repeated polls answer from the persisted row
    assert_eq!(service.task(task.task_id).await.unwrap(), finished);
    assert_eq!(store.task_count(), 1);
}

#[tokio::test]
async fn test_builtin_executors_end_to_end() {
    let executors = ExecutorSet::new(
        Arc::new(ContactExtractor::new()),
        Arc::new(KeywordClassifier::new()),
        Arc::new(MockExecutor::new()),
    );
    let (service, _store) = memory_service(executors, AnalysisConfig::default());

    let task = dispatched(
        service
            .analyze(
                WorkKind::Classification,
                AnalysisRequest::new("http://news.test").with_html(NEWS_PAGE),
            )
            .await
            .unwrap(),
    );

    let finished = wait_terminal(&service, task.task_id).await;
    assert_eq!(finished.result, Some(json!({"category": "News"})));
}

#[tokio::test]
async fn test_unchanged_content_is_skipped() {
    let mock = Arc::new(MockExecutor::new().returning(json!({"category": "News"})));
    let (service, _store) = mock_service(mock.clone());
    let request = AnalysisRequest::new("http://news.test").with_html(NEWS_PAGE);

    let first = service
        .analyze(WorkKind::Classification, request.clone())
        .await
        .unwrap();
    let AnalysisOutcome::Dispatched { record_id, task } = first else {
        panic!("first request must dispatch");
    };
    wait_terminal(&service, task.task_id).await;

    let second = service
        .analyze(WorkKind::Classification, request)
        .await
        .unwrap();
    match second {
        AnalysisOutcome::Skipped { record_id: skipped_id, tasks } => {
            assert_eq!(skipped_id, record_id);
            assert_eq!(tasks.get(WorkKind::Classification), Some(&task.task_id));
        }
        other => panic!("expected skip, got {:?}", other),
    }
    assert_eq!(mock.call_count(), 1);

    // Changed content dispatches again under the same record
    let third = service
        .analyze(
            WorkKind::Classification,
            AnalysisRequest::new("http://news.test").with_html("<p>weather forecast</p>"),
        )
        .await
        .unwrap();
    let AnalysisOutcome::Dispatched { record_id: third_id, task: third_task } = third else {
        panic!("changed content must dispatch");
    };
    assert_eq!(third_id, record_id);
    assert_ne!(third_task.task_id, task.task_id);
}

#[tokio::test]
async fn test_same_content_for_another_kind_still_dispatches() {
    let mock = Arc::new(MockExecutor::new());
    let (service, _store) = mock_service(mock.clone());
    let request = AnalysisRequest::new("http://news.test").with_html(NEWS_PAGE);

    service
        .analyze(WorkKind::Classification, request.clone())
        .await
        .unwrap();
    let social = service.analyze(WorkKind::Social, request).await.unwrap();

    assert!(matches!(social, AnalysisOutcome::Dispatched { .. }));
}

#[tokio::test]
async fn test_kind_reruns_after_another_kind_saw_new_content() {
    let mock = Arc::new(MockExecutor::new());
    let (service, store) = mock_service(mock.clone());
    let old_page = AnalysisRequest::new("http://news.test").with_html(NEWS_PAGE);
    let new_page = AnalysisRequest::new("http://news.test").with_html("<html><body>Updated</body></html>");

    let first = dispatched(service.analyze(WorkKind::Social, old_page.clone()).await.unwrap());
    let classification = dispatched(
        service
            .analyze(WorkKind::Classification, new_page.clone())
            .await
            .unwrap(),
    );

    // Social has only ever seen the old page
    let social = dispatched(service.analyze(WorkKind::Social, new_page.clone()).await.unwrap());
    for task_id in [first.task_id, classification.task_id, social.task_id] {
        wait_terminal(&service, task_id).await;
    }
    assert_eq!(mock.call_count(), 3);

    let record = store.get_subject("http://news.test").await.unwrap().unwrap();
    assert_eq!(record.tasks.social, Some(social.task_id));

    let again = service.analyze(WorkKind::Social, new_page).await.unwrap();
    assert!(matches!(again, AnalysisOutcome::Skipped { .. }));
    let back = service.analyze(WorkKind::Social, old_page).await.unwrap();
    assert!(matches!(back, AnalysisOutcome::Dispatched { .. }));
}

#[tokio::test]
async fn test_location_rate_spaces_submissions_without_dropping() {
    let mock = Arc::new(MockExecutor::new().returning(json!({"country_code": "N/A"})));
    let config = AnalysisConfig::default()
        .with_rate_policy(WorkKind::Location, RatePolicy::per_second(1));
    let (service, _store) = memory_service(ExecutorSet::uniform(mock.clone()), config);

    let started = Instant::now();
    let mut tasks = Vec::new();
    for host in ["a", "b", "c"] {
        let request = AnalysisRequest::new(format!("http://{}.test", host));
        tasks.push(dispatched(
            service.analyze(WorkKind::Location, request).await.unwrap(),
        ));
    }
    assert!(started.elapsed() >= Duration::from_millis(1900));

    for task in tasks {
        assert_eq!(wait_terminal(&service, task.task_id).await.state, TaskState::Success);
    }
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn test_bounded_wait_turns_into_throttled() {
    let mock = Arc::new(MockExecutor::new());
    let config = AnalysisConfig::default().with_rate_policy(
        WorkKind::Location,
        RatePolicy::per_second(1).with_max_wait(Duration::from_millis(50)),
    );
    let (service, store) = memory_service(ExecutorSet::uniform(mock), config);

    service
        .analyze(WorkKind::Location, AnalysisRequest::new("http://a.test"))
        .await
        .unwrap();
    let err = service
        .analyze(WorkKind::Location, AnalysisRequest::new("http://b.test"))
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Throttled { kind: WorkKind::Location, .. }));
    assert_eq!(store.subject_count(), 1);
    assert_eq!(store.task_count(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_create_one_subject() {
    let mock = Arc::new(MockExecutor::new());
    let (service, store) = mock_service(mock);

    let results = join_all((0..10).map(|_| {
        service.analyze(WorkKind::Location, AnalysisRequest::new("http://same.test"))
    }))
    .await;

    let task_ids: Vec<TaskId> = results
        .into_iter()
        .map(|result| dispatched(result.unwrap()).task_id)
        .collect();
    assert_eq!(store.subject_count(), 1);

    let view = service.subject("http://same.test").await.unwrap();
    let attached = view.tasks.location.expect("location task attached");
    assert!(task_ids.contains(&attached.task_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_polls_racing_the_push_agree_on_one_outcome() {
    let mock = Arc::new(
        MockExecutor::new()
            .returning(json!({"category": "News"}))
            .with_latch(),
    );
    let (service, store) = mock_service(mock.clone());

    let task = dispatched(
        service
            .analyze(
                WorkKind::Classification,
                AnalysisRequest::new("http://race.test").with_html(NEWS_PAGE),
            )
            .await
            .unwrap(),
    );

    // Pollers are spinning before the executor is released, so the first
    // terminal answers come from polls landing around the push
    let service = &service;
    let task_id = task.task_id;
    let pollers = join_all((0..8).map(|_| async move {
        loop {
            let record = service.task(task_id).await.unwrap();
            if record.is_terminal() {
                return record;
            }
            tokio::task::yield_now().await;
        }
    }));
    let release = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        mock.release();
    };
    let (polls, ()) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(pollers, release)
    })
    .await
    .expect("pollers never saw a terminal state");

    let finished = wait_terminal(service, task_id).await;
    assert_eq!(finished.state, TaskState::Success);
    for record in polls {
        assert_eq!(record, finished);
    }
    assert_eq!(store.task_count(), 1);
}

#[tokio::test]
async fn test_executor_failure_is_stored_as_data() {
    let mock = Arc::new(MockExecutor::new().failing("geo service down"));
    let (service, _store) = mock_service(mock);

    let task = dispatched(
        service
            .analyze(WorkKind::Location, AnalysisRequest::new("http://down.test"))
            .await
            .unwrap(),
    );

    let finished = wait_terminal(&service, task.task_id).await;
    assert_eq!(finished.state, TaskState::Failure);
    assert_eq!(
        finished.result,
        Some(json!({"error": "upstream", "detail": "upstream failure: geo service down"}))
    );
}

#[tokio::test]
async fn test_slow_executor_times_out() {
    let mock = Arc::new(MockExecutor::new().with_delay(Duration::from_secs(5)));
    let config = AnalysisConfig::default().with_executor_timeout(Duration::from_millis(50));
    let (service, _store) = memory_service(ExecutorSet::uniform(mock), config);

    let task = dispatched(
        service
            .analyze(WorkKind::Location, AnalysisRequest::new("http://slow.test"))
            .await
            .unwrap(),
    );

    let finished = wait_terminal(&service, task.task_id).await;
    assert_eq!(finished.state, TaskState::Failure);
    assert_eq!(finished.result.unwrap()["error"], "timeout");
}

#[tokio::test]
async fn test_validation_failure_leaves_no_trace() {
    let mock = Arc::new(MockExecutor::new());
    let (service, store) = mock_service(mock.clone());

    let err = service
        .analyze(WorkKind::Classification, AnalysisRequest::new("http://news.test"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Validation { field: "html", .. }));

    let err = service
        .analyze(WorkKind::Location, AnalysisRequest::new("mailto:someone@test"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Validation { field: "url", .. }));

    assert_eq!(store.subject_count(), 0);
    assert_eq!(store.task_count(), 0);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let (service, _store) = mock_service(Arc::new(MockExecutor::new()));

    let err = service.task(TaskId::new()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::TaskNotFound { .. }));
}

#[tokio::test]
async fn test_flag_and_save_are_idempotent() {
    let (service, _store) = mock_service(Arc::new(MockExecutor::new()));
    service
        .analyze(WorkKind::Location, AnalysisRequest::new("http://keep.test"))
        .await
        .unwrap();

    let flagged = service.flag("http://keep.test").await.unwrap();
    let again = service.flag("http://keep.test").await.unwrap();
    assert!(flagged.flagged);
    assert_eq!(again.timestamps.updated_at, flagged.timestamps.updated_at);

    let saved = service.save("http://keep.test").await.unwrap();
    assert!(saved.saved);
    assert!(saved.flagged);

    let err = service.flag("http://missing.test").await.unwrap_err();
    assert!(matches!(err, AnalysisError::SubjectNotFound { .. }));
}

#[tokio::test]
async fn test_override_requires_terminal_task() {
    let mock = Arc::new(
        MockExecutor::new()
            .returning(json!({"category": "News"}))
            .with_latch(),
    );
    let (service, _store) = mock_service(mock.clone());
    let task = dispatched(
        service
            .analyze(
                WorkKind::Classification,
                AnalysisRequest::new("http://news.test").with_html(NEWS_PAGE),
            )
            .await
            .unwrap(),
    );

    let err = service
        .override_task(task.task_id, json!({"category": "Sports"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::TaskNotTerminal { .. }));

    mock.release();
    wait_terminal(&service, task.task_id).await;

    let overridden = service
        .override_task(task.task_id, json!({"category": "Sports"}))
        .await
        .unwrap();
    assert_eq!(overridden.state, TaskState::Success);
    assert_eq!(overridden.result, Some(json!({"category": "Sports"})));
    assert_eq!(service.task(task.task_id).await.unwrap(), overridden);
}

#[tokio::test]
async fn test_subject_listing_resolves_tasks_and_delete_removes() {
    let (service, _store) = mock_service(Arc::new(MockExecutor::new()));
    let task = dispatched(
        service
            .analyze(WorkKind::Location, AnalysisRequest::new("http://list.test"))
            .await
            .unwrap(),
    );
    wait_terminal(&service, task.task_id).await;

    let views = service.subjects().await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(
        views[0].tasks.location.as_ref().map(|t| t.state),
        Some(TaskState::Success)
    );

    service.delete_subject("http://list.test").await.unwrap();
    assert!(service.subjects().await.unwrap().is_empty());
    let err = service.subject("http://list.test").await.unwrap_err();
    assert!(matches!(err, AnalysisError::SubjectNotFound { .. }));
}
