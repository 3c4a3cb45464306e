use super::*;
use crate::{
    registry::{Component, ControlDescriptor, Registration, SceneDescriptor},
    scene::Control,
};
use overlay_protocol::{
    domain::ControlId,
    protocol::{ControlProps, ControlRef},
};
use serde_json::json;
use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs.contents())
}

fn registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry
        .register([
            Registration::from(SceneDescriptor::default_scene(Component::named("Stage"))),
            ControlDescriptor::new("button", Component::named("Button")).into(),
            ControlDescriptor::new("joystick", Component::named("Joystick")).into(),
        ])
        .expect("register");
    Arc::new(registry)
}

fn scene_id(id: &str) -> SceneId {
    SceneId::from(id)
}

fn button(id: &str) -> ControlProps {
    ControlProps::new(id, "button")
}

fn create_scene(state: &mut State, id: &str, controls: Vec<ControlProps>) {
    state
        .on_scene_create(SceneBatch {
            scenes: vec![SceneProps::new(id).with_controls(controls)],
        })
        .expect("scene create");
}

fn create_group(state: &mut State, group_id: &str, scene: &str) {
    state
        .on_group_create(GroupBatch {
            groups: vec![GroupProps::new(group_id, scene)],
        })
        .expect("group create");
}

fn join(state: &mut State, group_id: &str) {
    let mut participant = ParticipantProps::new("s1", group_id);
    participant.user_id = 1;
    state
        .on_participant_join(ParticipantBatch {
            participants: vec![participant],
        })
        .expect("join");
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (Arc::clone(&count), count)
}

#[test]
fn scene_exists_exactly_between_create_and_delete() {
    let mut state = State::new(registry());
    assert!(state.scene(&scene_id("lobby")).is_none());

    create_scene(&mut state, "lobby", Vec::new());
    assert!(state.scene(&scene_id("lobby")).is_some());

    state
        .on_scene_update(SceneBatch {
            scenes: vec![SceneProps::new("lobby").with_meta("title", json!("Lobby"))],
        })
        .expect("update");
    let scene = state.scene(&scene_id("lobby")).expect("still present");
    assert_eq!(scene.get("title", String::new()), "Lobby");

    state
        .on_scene_delete(SceneDelete {
            scene_id: scene_id("lobby"),
            reassign_scene_id: None,
        })
        .expect("delete");
    assert!(state.scene(&scene_id("lobby")).is_none());
    assert!(state.scenes().is_empty());
}

#[test]
fn scene_create_populates_every_control() {
    let mut state = State::new(registry());
    create_scene(
        &mut state,
        "lobby",
        vec![button("a"), button("b"), ControlProps::new("c", "joystick")],
    );

    let scene = state.scene(&scene_id("lobby")).expect("scene");
    assert_eq!(scene.controls().len(), 3);
    for id in ["a", "b", "c"] {
        let control = scene.control(&ControlId::from(id)).expect("control");
        assert_eq!(control.scene_id(), &scene_id("lobby"));
    }
    assert_eq!(
        scene.control(&ControlId::from("c")).map(Control::kind),
        Some("joystick")
    );
}

#[test]
fn to_object_flattens_live_controls() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a"), button("b")]);

    let snapshot = state.scene(&scene_id("lobby")).expect("scene").to_object();
    let mut ids: Vec<&str> = snapshot
        .controls
        .iter()
        .map(|control| control.control_id.as_str())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, ["a", "b"]);

}

#[test]
fn every_scene_read_sees_live_controls() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a"), button("b")]);
    let scene = state.scene(&scene_id("lobby")).expect("scene");

    assert_eq!(scene.to_object().controls.len(), 2);
    assert_eq!(scene.get("controls", Vec::<ControlProps>::new()).len(), 2);
    let listed = scene.field("controls").expect("controls field");
    assert_eq!(listed.as_array().map(Vec::len), Some(2));
    assert_eq!(listed[0]["controlID"], json!("a"));
}

#[test]
fn scene_update_keeps_live_controls() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a")]);

    let notified = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notified);
    let _subscription = state
        .scene(&scene_id("lobby"))
        .expect("scene")
        .on_update(move |snapshot: &SceneProps| {
            let ids: Vec<String> = snapshot
                .controls
                .iter()
                .map(|control| control.control_id.to_string())
                .collect();
            sink.lock().unwrap().push(ids);
        });

    state
        .on_scene_update(SceneBatch {
            scenes: vec![SceneProps::new("lobby")
                .with_meta("title", json!("Lobby"))
                .with_controls(vec![button("z")])],
        })
        .expect("update");

    let scene = state.scene(&scene_id("lobby")).expect("scene");
    let live: Vec<&str> = scene
        .list_controls()
        .into_iter()
        .map(|control| control.id().as_str())
        .collect();
    assert_eq!(live, ["a"]);
    assert_eq!(scene.get("title", String::new()), "Lobby");
    assert_eq!(notified.lock().unwrap().as_slice(), &[vec!["a".to_string()]]);
}

#[test]
fn control_update_for_unknown_id_creates_it() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", Vec::new());

    state
        .on_control_update(ControlBatch {
            scene_id: scene_id("lobby"),
            controls: vec![button("late").with_meta("text", json!("Late"))],
        })
        .expect("update");

    let control = state
        .scene(&scene_id("lobby"))
        .and_then(|scene| scene.control(&ControlId::from("late")))
        .expect("created by update");
    assert_eq!(control.resource().get("text", String::new()), "Late");
}

#[test]
fn control_update_replaces_props_and_reemits_scene() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a").with_meta("cost", json!(5))]);

    let scene = state.scene(&scene_id("lobby")).expect("scene");
    let (scene_updates, scene_count) = counter();
    let _scene_sub = scene.on_update(move |snapshot: &SceneProps| {
        assert_eq!(snapshot.controls.len(), 1);
        scene_updates.fetch_add(1, Ordering::SeqCst);
    });
    let control_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&control_seen);
    let _control_sub = scene
        .control(&ControlId::from("a"))
        .expect("control")
        .resource()
        .on_update(move |props: &ControlProps| sink.lock().unwrap().push(props.clone()));

    let next = button("a").with_meta("text", json!("Press"));
    state
        .on_control_update(ControlBatch {
            scene_id: scene_id("lobby"),
            controls: vec![next.clone()],
        })
        .expect("update");

    assert_eq!(control_seen.lock().unwrap().as_slice(), &[next]);
    assert_eq!(scene_count.load(Ordering::SeqCst), 1);
    let control = state
        .scene(&scene_id("lobby"))
        .and_then(|scene| scene.control(&ControlId::from("a")))
        .expect("control");
    assert_eq!(control.resource().field("cost"), None);
}

#[test]
fn control_create_reemits_scene_snapshot() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a")]);

    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    let _subscription = state
        .scene(&scene_id("lobby"))
        .expect("scene")
        .on_update(move |snapshot: &SceneProps| {
            sink.lock().unwrap().push(snapshot.controls.len());
        });

    state
        .on_control_create(ControlBatch {
            scene_id: scene_id("lobby"),
            controls: vec![button("b"), button("c")],
        })
        .expect("create");

    assert_eq!(snapshots.lock().unwrap().as_slice(), &[3]);
}

#[test]
fn duplicate_control_create_drops_whole_event() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a")]);

    let (_, logs) = with_captured_logs(|| {
        state
            .on_control_create(ControlBatch {
                scene_id: scene_id("lobby"),
                controls: vec![button("b"), button("a")],
            })
            .expect("precondition violations are swallowed");
    });

    let scene = state.scene(&scene_id("lobby")).expect("scene");
    assert_eq!(scene.controls().len(), 1, "no partial application");
    assert!(logs.contains("Tried to create control \"a\""), "{logs}");
}

#[test]
fn control_delete_notifies_and_skips_unknown_ids() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a"), button("b")]);

    let deleted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&deleted);
    let _subscription = state
        .scene(&scene_id("lobby"))
        .and_then(|scene| scene.control(&ControlId::from("a")))
        .expect("control")
        .resource()
        .on_delete(move |reason| sink.lock().unwrap().push(reason.clone()));

    state
        .on_control_delete(ControlDelete {
            scene_id: scene_id("lobby"),
            controls: vec![
                ControlRef {
                    control_id: ControlId::from("a"),
                },
                ControlRef {
                    control_id: ControlId::from("missing"),
                },
            ],
        })
        .expect("delete");

    let scene = state.scene(&scene_id("lobby")).expect("scene");
    assert!(scene.control(&ControlId::from("a")).is_none());
    assert!(scene.control(&ControlId::from("b")).is_some());
    assert_eq!(
        deleted.lock().unwrap().as_slice(),
        &[DeleteReason::Control {
            scene_id: scene_id("lobby"),
            control_id: ControlId::from("a"),
        }]
    );
}

#[test]
fn controls_in_unknown_scene_are_dropped() {
    let mut state = State::new(registry());
    let (_, logs) = with_captured_logs(|| {
        state
            .on_control_create(ControlBatch {
                scene_id: scene_id("nowhere"),
                controls: vec![button("a")],
            })
            .expect("swallowed");
    });
    assert!(state.scenes().is_empty());
    assert!(logs.contains("onControlCreate"), "{logs}");
}

#[test]
fn delete_of_missing_scene_is_logged_not_raised() {
    let mut state = State::new(registry());
    create_scene(&mut state, "arena", Vec::new());

    let (result, logs) = with_captured_logs(|| {
        state.on_scene_delete(SceneDelete {
            scene_id: scene_id("lobby"),
            reassign_scene_id: None,
        })
    });

    assert!(result.is_ok());
    assert_eq!(state.scenes().len(), 1);
    assert!(state.scene(&scene_id("arena")).is_some());
    assert!(logs.contains("ERROR"), "{logs}");
    assert!(
        logs.contains("Tried to delete scene \"lobby\", but it didn't exist"),
        "{logs}"
    );
}

#[test]
fn duplicate_scene_create_leaves_replica_unchanged() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a")]);

    state
        .on_scene_create(SceneBatch {
            scenes: vec![
                SceneProps::new("arena"),
                SceneProps::new("lobby").with_controls(vec![button("z")]),
            ],
        })
        .expect("swallowed");

    assert!(state.scene(&scene_id("arena")).is_none());
    let lobby = state.scene(&scene_id("lobby")).expect("lobby");
    assert!(lobby.control(&ControlId::from("z")).is_none());
}

#[test]
fn update_of_missing_scene_is_dropped() {
    let mut state = State::new(registry());
    state
        .on_scene_update(SceneBatch {
            scenes: vec![SceneProps::new("ghost")],
        })
        .expect("swallowed");
    assert!(state.scenes().is_empty());
}

#[test]
fn unregistered_control_kind_is_a_configuration_error() {
    let mut state = State::new(registry());
    let err = state
        .on_scene_create(SceneBatch {
            scenes: vec![SceneProps::new("lobby").with_controls(vec![ControlProps::new(
                "dial", "knob",
            )])],
        })
        .expect_err("configuration errors propagate");

    assert!(!err.is_precondition());
    assert!(matches!(
        err,
        StateError::Configuration {
            source: crate::error::RegistryError::MissingControl { ref kind },
            ..
        } if kind == "knob"
    ));
    assert!(err.to_string().contains("control \"dial\""));
    assert!(state.scenes().is_empty());
}

#[test]
fn unresolvable_scene_is_a_configuration_error() {
    let mut registry = Registry::new();
    registry
        .register([SceneDescriptor::for_id("lobby", Component::named("Lobby"))])
        .expect("register");
    let mut state = State::new(Arc::new(registry));

    create_scene(&mut state, "lobby", Vec::new());
    let err = state
        .apply(ChannelEvent::SceneCreate(SceneBatch {
            scenes: vec![SceneProps::new("arena")],
        }))
        .expect_err("no default scene");
    assert!(err.to_string().contains("scene \"arena\""));
}

#[test]
fn scene_descriptor_resolves_through_registry() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a")]);

    let scene = state.scene(&scene_id("lobby")).expect("scene");
    let descriptor = scene.descriptor(state.registry()).expect("descriptor");
    assert_eq!(descriptor.component.name(), "Stage");
    let control = scene.control(&ControlId::from("a")).expect("control");
    assert_eq!(
        control
            .descriptor(state.registry())
            .expect("descriptor")
            .component
            .name(),
        "Button"
    );
}

#[test]
fn join_links_participant_to_group() {
    let mut state = State::new(registry());
    assert!(state.participant().group_id().is_none());
    assert!(state.participant_group().is_none());

    create_scene(&mut state, "lobby", Vec::new());
    create_group(&mut state, "default", "lobby");
    join(&mut state, "default");

    let participant = state.participant();
    assert_eq!(participant.group_id(), Some(&GroupId::from("default")));
    assert_eq!(
        participant.props().map(|props| props.group_id.clone()),
        Some(GroupId::from("default"))
    );
    assert_eq!(participant.get("userID", 0_u64), 1);

    let group = state.participant_group().expect("group");
    assert_eq!(group.id(), &GroupId::from("default"));
    assert_eq!(
        state.participant_scene().map(Scene::id),
        Some(&scene_id("lobby"))
    );
}

#[test]
fn participant_reads_default_until_first_update() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", Vec::new());
    create_group(&mut state, "default", "lobby");

    assert_eq!(state.participant().get("username", String::from("?")), "?");
    assert_eq!(state.participant().field("sessionID"), None);
    assert_eq!(state.participant().to_object(), None);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = state
        .participant()
        .on_update(move |props: &ParticipantProps| {
            sink.lock().unwrap().push(props.session_id.clone());
        });
    join(&mut state, "default");

    assert_eq!(seen.lock().unwrap().as_slice(), ["s1".to_string()]);
    assert_eq!(state.participant().field("sessionID"), Some(json!("s1")));

    subscription.unsubscribe();
    join(&mut state, "default");
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn participant_move_to_unknown_group_is_dropped() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", Vec::new());
    create_group(&mut state, "default", "lobby");
    join(&mut state, "default");

    let (_, logs) = with_captured_logs(|| {
        state
            .on_participant_update(ParticipantBatch {
                participants: vec![ParticipantProps::new("s1", "vip")],
            })
            .expect("swallowed");
    });

    assert_eq!(
        state.participant().group_id(),
        Some(&GroupId::from("default"))
    );
    assert!(
        logs.contains("Tried to move participant to group \"vip\""),
        "{logs}"
    );
}

#[test]
fn empty_participant_event_is_dropped() {
    let mut state = State::new(registry());
    state
        .on_participant_update(ParticipantBatch {
            participants: Vec::new(),
        })
        .expect("swallowed");
    assert!(state.participant().props().is_none());
}

#[test]
fn group_update_notifies_only_the_participants_group() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", Vec::new());
    create_scene(&mut state, "arena", Vec::new());
    create_group(&mut state, "default", "lobby");
    create_group(&mut state, "red", "lobby");
    join(&mut state, "default");

    let (notified, count) = counter();
    let _subscription = state.participant().on_group_update(move |group| {
        assert_eq!(group.group_id, GroupId::from("default"));
        notified.fetch_add(1, Ordering::SeqCst);
    });

    state
        .on_group_update(GroupBatch {
            groups: vec![GroupProps::new("red", "arena")],
        })
        .expect("other group");
    assert_eq!(count.load(Ordering::SeqCst), 0);

    state
        .on_group_update(GroupBatch {
            groups: vec![GroupProps::new("default", "arena")],
        })
        .expect("own group");
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(
        state.participant_scene().map(Scene::id),
        Some(&scene_id("arena"))
    );
}

#[test]
fn group_requires_existing_scene() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", Vec::new());

    state
        .on_group_create(GroupBatch {
            groups: vec![
                GroupProps::new("default", "lobby"),
                GroupProps::new("red", "missing"),
            ],
        })
        .expect("swallowed");
    assert!(state.groups().is_empty());

    create_group(&mut state, "default", "lobby");
    state
        .on_group_update(GroupBatch {
            groups: vec![GroupProps::new("default", "missing")],
        })
        .expect("swallowed");
    assert_eq!(
        state.group(&GroupId::from("default")).map(Group::scene_id),
        Some(&scene_id("lobby"))
    );
}

#[test]
fn group_delete_emits_and_removes() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", Vec::new());
    create_group(&mut state, "red", "lobby");
    let mut events = state.subscribe_events();

    let deleted = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&deleted);
    let _subscription = state
        .group(&GroupId::from("red"))
        .expect("group")
        .resource()
        .on_delete(move |reason| *sink.lock().unwrap() = Some(reason.clone()));

    let event = GroupDelete {
        group_id: GroupId::from("red"),
        reassign_group_id: Some(GroupId::from("default")),
    };
    state.on_group_delete(event.clone()).expect("delete");

    assert!(state.group(&GroupId::from("red")).is_none());
    assert_eq!(
        *deleted.lock().unwrap(),
        Some(DeleteReason::Group(event.clone()))
    );
    assert_eq!(
        events.try_recv().expect("domain event"),
        StateEvent::GroupDeleted {
            group: GroupProps::new("red", "lobby"),
            event,
        }
    );
}

#[test]
fn scene_delete_cascades_to_controls_and_orphans_groups() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("a")]);
    create_group(&mut state, "default", "lobby");
    join(&mut state, "default");

    let scene_deletes = Arc::new(AtomicUsize::new(0));
    let control_deletes = Arc::new(AtomicUsize::new(0));
    {
        let scene = state.scene(&scene_id("lobby")).expect("scene");
        let counter = Arc::clone(&scene_deletes);
        let _ = scene.on_delete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&control_deletes);
        let _ = scene
            .control(&ControlId::from("a"))
            .expect("control")
            .resource()
            .on_delete(move |reason| {
                assert!(matches!(reason, DeleteReason::Scene(_)));
                counter.fetch_add(1, Ordering::SeqCst);
            });
    }

    let (_, logs) = with_captured_logs(|| {
        state
            .on_scene_delete(SceneDelete {
                scene_id: scene_id("lobby"),
                reassign_scene_id: Some(scene_id("arena")),
            })
            .expect("delete");
    });

    assert_eq!(scene_deletes.load(Ordering::SeqCst), 1);
    assert_eq!(control_deletes.load(Ordering::SeqCst), 1);
    assert!(logs.contains("deleted scene is still assigned to groups"), "{logs}");

    let group = state.group(&GroupId::from("default")).expect("orphan kept");
    assert!(group.scene(&state).is_none());
    assert!(state.participant_group().is_some());
    assert!(state.participant_scene().is_none());
}

#[test]
fn domain_events_follow_application_order() {
    let mut state = State::new(registry());
    let mut events = state.subscribe_events();

    create_scene(&mut state, "lobby", vec![button("a")]);
    create_group(&mut state, "default", "lobby");
    state
        .apply(ChannelEvent::Ready(ReadyEvent { is_ready: true }))
        .expect("ready");
    state
        .on_scene_delete(SceneDelete {
            scene_id: scene_id("lobby"),
            reassign_scene_id: None,
        })
        .expect("delete");

    match events.try_recv().expect("scene created") {
        StateEvent::SceneCreated(scene) => {
            assert_eq!(scene.scene_id, scene_id("lobby"));
            assert_eq!(scene.controls.len(), 1);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(
        events.try_recv().expect("group created"),
        StateEvent::GroupCreated(GroupProps::new("default", "lobby"))
    );
    assert_eq!(events.try_recv().expect("ready"), StateEvent::Ready(true));
    match events.try_recv().expect("scene deleted") {
        StateEvent::SceneDeleted { scene, event } => {
            assert_eq!(scene.controls.len(), 1);
            assert_eq!(event.scene_id, scene_id("lobby"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(events.try_recv().is_err());
    assert!(state.is_ready());
}

#[test]
fn dump_lists_everything_sorted() {
    let mut state = State::new(registry());
    create_scene(&mut state, "lobby", vec![button("b"), button("a")]);
    create_scene(&mut state, "arena", Vec::new());
    create_group(&mut state, "default", "lobby");
    join(&mut state, "default");

    let dump = serde_json::to_value(state.dump()).expect("dump");
    assert_eq!(dump["isReady"], json!(false));
    assert_eq!(dump["participant"]["groupID"], json!("default"));
    assert_eq!(dump["scenes"][0]["sceneID"], json!("arena"));
    assert_eq!(dump["scenes"][1]["controls"][0]["controlID"], json!("a"));
    assert_eq!(dump["scenes"][1]["controls"][1]["controlID"], json!("b"));
    assert_eq!(dump["groups"][0]["sceneID"], json!("lobby"));
}
