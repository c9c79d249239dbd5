mod common;

use chrono::{Duration, Utc};
use univo::{
    announcements::{self, AnnouncementQuery, Audience, CreateAnnouncement},
    applications, clubs,
    dues::{self, CreateDues, DuesQuery},
    error::Error,
    events::{self, CreateEvent},
    membership::{self, AddMember},
    models::{DuesFrequency, NotificationKind, PaymentStatus, Role},
    notifications,
    store::ClubFilter,
};

async fn join(store: &univo::store::DynStore, admin: i32, club_id: i32, user_id: i32, role: Role) {
    membership::add_member(
        store,
        admin,
        club_id,
        AddMember {
            user_id,
            role: Some(role),
            status: None,
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn creator_becomes_admin_and_names_stay_unique() {
    let store = common::store();
    let ada = common::user(&store, "ada").await;
    let club = common::club(&store, &ada, "Debate").await;

    let role = membership::get_role(&store, club.id, ada.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.role, Role::Admin);
    assert!(role.is_active());

    let err = clubs::create(
        &store,
        ada.id,
        clubs::CreateClub {
            name: "Debate".into(),
            description: String::new(),
            category: None,
            logo: None,
            banner: None,
            max_members: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err:?}");

    let listed = clubs::list(
        &store,
        ClubFilter {
            category: Some("academic".into()),
            active: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn stats_count_active_members_and_open_work() {
    let store = common::store();
    let ada = common::user(&store, "ada").await;
    let bob = common::user(&store, "bob").await;
    let carol = common::user(&store, "carol").await;
    let club = common::club(&store, &ada, "Debate").await;
    join(&store, ada.id, club.id, bob.id, Role::Member).await;
    applications::apply(&store, club.id, carol.id, String::new())
        .await
        .unwrap();
    for days in [-2, 5] {
        events::create(
            &store,
            ada.id,
            CreateEvent {
                club_id: Some(club.id),
                title: "Tournament".into(),
                description: String::new(),
                banner: None,
                date: Utc::now() + Duration::days(days),
                location: None,
                capacity: Some(30),
                price: 0,
                requires_payment: false,
            },
        )
        .await
        .unwrap();
    }

    let stats = clubs::stats(&store, club.id).await.unwrap();
    assert_eq!(stats.total_members, 2);
    assert_eq!(stats.pending_applications, 1);
    assert_eq!(stats.upcoming_events, 1);
    assert_eq!(stats.active_campaigns, 0);

    let memberships = clubs::for_user(&store, bob.id).await.unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].club.id, club.id);
}

#[tokio::test]
async fn club_events_need_an_officer() {
    let store = common::store();
    let ada = common::user(&store, "ada").await;
    let bob = common::user(&store, "bob").await;
    let club = common::club(&store, &ada, "Debate").await;
    join(&store, ada.id, club.id, bob.id, Role::Member).await;

    let err = events::create(
        &store,
        bob.id,
        CreateEvent {
            club_id: Some(club.id),
            title: "Mixer".into(),
            description: String::new(),
            banner: None,
            date: Utc::now() + Duration::days(1),
            location: None,
            capacity: None,
            price: 0,
            requires_payment: false,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");
}

#[tokio::test]
async fn dues_are_configured_by_admins_and_paid_by_members() {
    let store = common::store();
    let ada = common::user(&store, "ada").await;
    let bob = common::user(&store, "bob").await;
    let outsider = common::user(&store, "eve").await;
    let club = common::club(&store, &ada, "Debate").await;
    join(&store, ada.id, club.id, bob.id, Role::Member).await;

    let spring = |amount, is_recurring, frequency| CreateDues {
        name: "Spring dues".into(),
        description: None,
        amount,
        due_date: Utc::now() + Duration::days(30),
        is_recurring,
        frequency,
    };

    let err = dues::create(&store, ada.id, club.id, spring(2000, true, None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");
    let err = dues::create(&store, bob.id, club.id, spring(2000, false, None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");

    let paid = dues::create(
        &store,
        ada.id,
        club.id,
        spring(2000, true, Some(DuesFrequency::Semester)),
    )
    .await
    .unwrap();
    let free = dues::create(&store, ada.id, club.id, spring(0, false, None))
        .await
        .unwrap();

    let listed = dues::list(&store, bob.id, club.id, DuesQuery { active: true })
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    let err = dues::list(&store, outsider.id, club.id, DuesQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");

    let pending = dues::pay(&store, bob.id, paid.id).await.unwrap();
    assert_eq!(pending.amount, 2000);
    assert_eq!(pending.payment_status, PaymentStatus::Pending);
    assert!(pending.paid_at.is_none());

    let settled = dues::pay(&store, bob.id, free.id).await.unwrap();
    assert_eq!(settled.payment_status, PaymentStatus::Completed);
    assert!(settled.paid_at.is_some());

    let err = dues::pay(&store, outsider.id, paid.id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");

    assert_eq!(dues::list_own_payments(&store, bob.id).await.unwrap().len(), 2);
    let err = dues::list_payments(&store, bob.id, paid.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");
    assert_eq!(
        dues::list_payments(&store, ada.id, paid.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn announcements_notify_each_recipient_once() {
    let store = common::store();
    let ada = common::user(&store, "ada").await;
    let bob = common::user(&store, "bob").await;
    let carol = common::user(&store, "carol").await;
    let club = common::club(&store, &ada, "Debate").await;
    join(&store, ada.id, club.id, bob.id, Role::Member).await;
    join(&store, ada.id, club.id, carol.id, Role::Officer).await;

    let announcement = announcements::post(
        &store,
        ada.id,
        CreateAnnouncement {
            club_id: Some(club.id),
            title: "Practice moved".into(),
            content: "Room 204 this week".into(),
            audience: Audience::All,
        },
    )
    .await
    .unwrap();
    assert_eq!(announcement.recipients.len(), 2);
    assert!(!announcement.recipients.contains(&ada.id));

    for user in [&bob, &carol] {
        let inbox = notifications::list(&store, user.id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::Announcement);
    }
    assert!(notifications::list(&store, ada.id).await.unwrap().is_empty());

    announcements::post(
        &store,
        carol.id,
        CreateAnnouncement {
            club_id: Some(club.id),
            title: "Officers meeting".into(),
            content: "Friday".into(),
            audience: Audience::Officers,
        },
    )
    .await
    .unwrap();
    assert_eq!(notifications::list(&store, ada.id).await.unwrap().len(), 1);
    assert_eq!(notifications::list(&store, bob.id).await.unwrap().len(), 1);

    let err = announcements::post(
        &store,
        bob.id,
        CreateAnnouncement {
            club_id: Some(club.id),
            title: "Hi".into(),
            content: "all".into(),
            audience: Audience::All,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");

    let club_feed = AnnouncementQuery {
        club_id: Some(club.id),
    };
    let listed = announcements::list(&store, bob.id, club_feed.clone())
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    let outsider = common::user(&store, "eve").await;
    let err = announcements::list(&store, outsider.id, club_feed)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");
}

#[tokio::test]
async fn platform_announcements_need_explicit_recipients() {
    let store = common::store();
    let ada = common::user(&store, "ada").await;
    let bob = common::user(&store, "bob").await;

    let err = announcements::post(
        &store,
        ada.id,
        CreateAnnouncement {
            club_id: None,
            title: "Welcome".into(),
            content: "Hello everyone".into(),
            audience: Audience::All,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");

    announcements::post(
        &store,
        ada.id,
        CreateAnnouncement {
            club_id: None,
            title: "Welcome".into(),
            content: "Hello bob".into(),
            audience: Audience::Custom {
                recipients: vec![bob.id, bob.id, ada.id],
            },
        },
    )
    .await
    .unwrap();
    assert_eq!(notifications::list(&store, bob.id).await.unwrap().len(), 1);
    assert!(notifications::list(&store, ada.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn custom_recipients_must_be_real_users() {
    let store = common::store();
    let ada = common::user(&store, "ada").await;
    let bob = common::user(&store, "bob").await;

    let err = announcements::post(
        &store,
        ada.id,
        CreateAnnouncement {
            club_id: None,
            title: "Welcome".into(),
            content: "Hello".into(),
            audience: Audience::Custom {
                recipients: vec![bob.id, 424242],
            },
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");
    assert!(notifications::list(&store, bob.id).await.unwrap().is_empty());
    assert!(notifications::list(&store, 424242)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn club_announcements_stay_inside_the_club() {
    let store = common::store();
    let ada = common::user(&store, "ada").await;
    let bob = common::user(&store, "bob").await;
    let outsider = common::user(&store, "eve").await;
    let club = common::club(&store, &ada, "Debate").await;
    join(&store, ada.id, club.id, bob.id, Role::Member).await;

    let custom = |recipients| CreateAnnouncement {
        club_id: Some(club.id),
        title: "Carpool".into(),
        content: "Leaving at 8".into(),
        audience: Audience::Custom { recipients },
    };

    let err = announcements::post(&store, ada.id, custom(vec![bob.id, outsider.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");
    assert!(notifications::list(&store, outsider.id)
        .await
        .unwrap()
        .is_empty());

    let posted = announcements::post(&store, ada.id, custom(vec![bob.id]))
        .await
        .unwrap();
    assert_eq!(posted.recipients, vec![bob.id]);
    assert_eq!(notifications::list(&store, bob.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn notifications_belong_to_their_owner() {
    let store = common::store();
    let ada = common::user(&store, "ada").await;
    let bob = common::user(&store, "bob").await;
    let note = notifications::notify(
        &store,
        ada.id,
        NotificationKind::Event,
        "Reminder",
        "Tournament tomorrow",
        None,
    )
    .await
    .unwrap();

    let err = notifications::mark_read(&store, bob.id, note.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");

    let read = notifications::mark_read(&store, ada.id, note.id).await.unwrap();
    assert!(read.is_read);
    let again = notifications::mark_read(&store, ada.id, note.id).await.unwrap();
    assert!(again.is_read);
    assert_eq!(notifications::mark_all_read(&store, ada.id).await.unwrap(), 0);
}
