//! Conversion from GitHub wire payloads to typed summaries.

use crate::access::{
    PullRequestDetail, PullRequestSummary, RepositorySummary, ReviewSummary, UserSummary,
};

use super::types::{GhPullRequest, GhRepository, GhReview, GhUser};

pub(crate) fn to_user_summary(user: GhUser) -> UserSummary {
    UserSummary {
        external_id: user.id,
        login: user.login,
        name: user.name.filter(|name| !name.trim().is_empty()),
        kind: user.kind,
    }
}

pub(crate) fn to_repository_summary(repo: GhRepository) -> RepositorySummary {
    RepositorySummary {
        external_id: repo.id,
        organization: repo.owner.login,
        name: repo.name,
        description: repo.description,
        default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
        is_private: repo.private,
        is_archived: repo.archived,
        updated_at: repo.updated_at,
    }
}

pub(crate) fn to_pull_request_summary(pr: &GhPullRequest) -> PullRequestSummary {
    PullRequestSummary {
        external_id: pr.id,
        number: pr.number,
        title: pr.title.clone(),
        state: pr.state.clone(),
        author: pr.user.clone().map(to_user_summary),
        created_at: pr.created_at,
        updated_at: pr.updated_at,
    }
}

pub(crate) fn to_pull_request_detail(pr: GhPullRequest) -> PullRequestDetail {
    PullRequestDetail {
        summary: to_pull_request_summary(&pr),
        additions: pr.additions.unwrap_or(0),
        deletions: pr.deletions.unwrap_or(0),
        changed_files: pr.changed_files.unwrap_or(0),
        commits: pr.commits.unwrap_or(0),
        merged: pr.merged.unwrap_or(pr.merged_at.is_some()),
        closed_at: pr.closed_at,
        merged_at: pr.merged_at,
    }
}

pub(crate) fn to_review_summary(review: GhReview) -> ReviewSummary {
    ReviewSummary {
        external_id: review.id,
        author: review.user.map(to_user_summary),
        state: review.state,
        body: review.body.filter(|body| !body.is_empty()),
        submitted_at: review.submitted_at,
    }
}
