//! Demo data for local development, written through the repositories.

use agora_database::{
    CommunityMember, CreateCommunityRequest, CreateJoinRequest, CreateRuleRequest, MemberRole,
};
use agora_runtime::CommunityServices;
use anyhow::Context;
use tracing::info;
use uuid::Uuid;

struct SeedCommunity {
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    is_approved: bool,
    categories: &'static [&'static str],
    rules: &'static [&'static str],
}

const CATEGORIES: &[&str] = &[
    "Technology",
    "Health",
    "Programming",
    "Design",
    "Books",
    "Travel",
    "Food",
    "Photography",
];

const COMMUNITIES: &[SeedCommunity] = &[
    SeedCommunity {
        name: "Tech Enthusiasts",
        slug: "tech",
        description: "Gadgets, software releases and where technology is heading.",
        is_approved: true,
        categories: &["Technology"],
        rules: &["Be respectful", "No self-promotion without context"],
    },
    SeedCommunity {
        name: "Fitness & Health",
        slug: "fitness",
        description: "Training routines, nutrition and wellness.",
        is_approved: true,
        categories: &["Health"],
        rules: &["No medical advice presented as fact"],
    },
    SeedCommunity {
        name: "Developers Hub",
        slug: "dev",
        description: "Programming languages, tooling and collaborative projects.",
        is_approved: true,
        categories: &["Technology", "Programming"],
        rules: &["Share code as text, not screenshots", "Tag your language"],
    },
    SeedCommunity {
        name: "Design Showcase",
        slug: "design",
        description: "Show your work, get feedback and find inspiration.",
        is_approved: true,
        categories: &["Design"],
        rules: &["Credit the original artist"],
    },
    SeedCommunity {
        name: "Book Club",
        slug: "books",
        description: "Monthly reads, recommendations and reviews.",
        is_approved: true,
        categories: &["Books"],
        rules: &["Mark spoilers"],
    },
    SeedCommunity {
        name: "Travel Explorers",
        slug: "travel",
        description: "Tips, photos and stories from the road.",
        is_approved: false,
        categories: &["Travel", "Photography"],
        rules: &[],
    },
    SeedCommunity {
        name: "Foodie Paradise",
        slug: "food",
        description: "Recipes, restaurant reviews and cooking tips.",
        is_approved: false,
        categories: &["Food"],
        rules: &[],
    },
    SeedCommunity {
        name: "Photography Club",
        slug: "photo",
        description: "Techniques, critiques and camera gear.",
        is_approved: true,
        categories: &["Photography"],
        rules: &["Original photos only"],
    },
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub communities: usize,
    pub members: usize,
    pub rules: usize,
    pub join_requests: usize,
}

/// Populate an empty database. Returns `None` when communities already exist.
pub async fn seed(services: &CommunityServices) -> anyhow::Result<Option<SeedSummary>> {
    seed_communities(services, COMMUNITIES).await
}

/// Every write runs in one transaction; a failure leaves nothing behind.
async fn seed_communities(
    services: &CommunityServices,
    communities: &[SeedCommunity],
) -> anyhow::Result<Option<SeedSummary>> {
    if services.communities.count_all().await? > 0 {
        info!("communities present, skipping seed");
        return Ok(None);
    }

    let mut existing = Vec::with_capacity(CATEGORIES.len());
    for name in CATEGORIES {
        existing.push(services.categories.find_by_name(name).await?);
    }

    let mut summary = SeedSummary::default();
    let users: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    let mut uow = services.join_requests.begin_tx().await?;

    let mut category_ids = Vec::with_capacity(CATEGORIES.len());
    for (name, found) in CATEGORIES.iter().zip(existing) {
        let category = match found {
            Some(category) => category,
            None => {
                summary.categories += 1;
                services
                    .categories
                    .create_tx(uow.conn(), name)
                    .await
                    .with_context(|| format!("failed to create category {name}"))?
            }
        };
        category_ids.push((*name, category.id));
    }

    for (index, entry) in communities.iter().enumerate() {
        let creator = users[index % users.len()];
        let community = services
            .communities
            .create_tx(
                uow.conn(),
                &CreateCommunityRequest {
                    name: entry.name.to_string(),
                    description: entry.description.to_string(),
                    logo_url: format!("https://example.com/logos/{}.png", entry.slug),
                    banner_url: format!("https://example.com/banners/{}.png", entry.slug),
                    creator_id: creator,
                    is_approved: entry.is_approved,
                },
            )
            .await
            .with_context(|| format!("failed to create community {}", entry.name))?;
        summary.communities += 1;

        for wanted in entry.categories {
            if let Some((_, category_id)) = category_ids.iter().find(|(name, _)| name == wanted) {
                services
                    .categories
                    .add_community_to_category_tx(uow.conn(), community.id, *category_id)
                    .await?;
            }
        }

        let mut admin = CommunityMember::new(community.id, creator, MemberRole::Admin);
        services.members.add_tx(uow.conn(), &mut admin).await?;
        summary.members += 1;

        let moderator = users[(index + 1) % users.len()];
        let role = if index % 2 == 0 {
            MemberRole::Moderator
        } else {
            MemberRole::Member
        };
        services
            .members
            .add_tx(uow.conn(), &mut CommunityMember::new(community.id, moderator, role))
            .await?;
        summary.members += 1;

        for rule in entry.rules {
            services
                .rules
                .add_tx(
                    uow.conn(),
                    &CreateRuleRequest {
                        community_id: community.id,
                        rule_text: rule.to_string(),
                    },
                )
                .await?;
            summary.rules += 1;
        }

        if !entry.is_approved || index % 3 == 0 {
            let applicant = users[(index + 2) % users.len()];
            services
                .join_requests
                .add_tx(
                    uow.conn(),
                    &CreateJoinRequest {
                        community_id: community.id,
                        user_id: applicant,
                    },
                )
                .await?;
            summary.join_requests += 1;
        }
    }

    uow.commit().await.context("failed to commit seed data")?;

    info!(
        communities = summary.communities,
        members = summary.members,
        join_requests = summary.join_requests,
        "seed complete"
    );
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_config::AppConfig;
    use tempfile::TempDir;

    async fn services(temp_dir: &TempDir) -> CommunityServices {
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", temp_dir.path().join("seed.db").display());
        config.database.max_connections = 2;
        CommunityServices::initialise(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_seed_populates_once() {
        let temp_dir = TempDir::new().unwrap();
        let services = services(&temp_dir).await;

        let summary = seed(&services).await.unwrap().unwrap();
        assert_eq!(summary.communities, COMMUNITIES.len());
        assert_eq!(summary.categories, CATEGORIES.len());
        assert_eq!(summary.members, COMMUNITIES.len() * 2);

        assert_eq!(
            services.communities.count_all().await.unwrap(),
            COMMUNITIES.len() as i64
        );
        let approved = services
            .communities
            .search("", &[], Some(true), 0, 100)
            .await
            .unwrap();
        assert_eq!(
            approved.total,
            COMMUNITIES.iter().filter(|c| c.is_approved).count() as i64
        );

        let dev = services
            .communities
            .find_by_name("Developers Hub")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dev.categories.len(), 2);

        assert!(seed(&services).await.unwrap().is_none());
        assert_eq!(
            services.communities.count_all().await.unwrap(),
            COMMUNITIES.len() as i64
        );
    }

    #[tokio::test]
    async fn test_failed_seed_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let services = services(&temp_dir).await;

        let clash = SeedCommunity {
            name: "Twins",
            slug: "twins",
            description: "Created twice on purpose.",
            is_approved: true,
            categories: &["Technology"],
            rules: &["Be kind"],
        };
        let twin = SeedCommunity { slug: "twins-2", ..clash };

        let err = seed_communities(&services, &[clash, twin]).await.unwrap_err();
        assert!(format!("{err:#}").contains("Twins"));

        assert_eq!(services.communities.count_all().await.unwrap(), 0);
        assert!(services.categories.list().await.unwrap().is_empty());

        let summary = seed(&services).await.unwrap().unwrap();
        assert_eq!(summary.categories, CATEGORIES.len());
        assert_eq!(summary.communities, COMMUNITIES.len());
    }
}
