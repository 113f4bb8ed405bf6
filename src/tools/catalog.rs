//! Tool catalog for the recipe API

use crate::downstream::HttpMethod;
use crate::error::{GatewayError, Result};
use crate::tools::definition::{ParamKind, ParamSpec, ToolDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Registered tools, in registration order
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<Arc<ToolDefinition>>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: ToolDefinition) -> Result<()> {
        if self.index.contains_key(&tool.name) {
            return Err(GatewayError::config(format!("Duplicate tool name '{}'", tool.name)));
        }
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn tools(&self) -> &[Arc<ToolDefinition>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The wrappers exposed by this server
    pub fn mealie() -> Result<Self> {
        let mut catalog = Self::new();
        for tool in mealie_tools() {
            catalog.register(tool)?;
        }
        Ok(catalog)
    }
}

fn pagination() -> Vec<ParamSpec> {
    vec![
        ParamSpec::new("order_by", "orderBy", ParamKind::String, "Field to order by"),
        ParamSpec::new(
            "order_by_null_position",
            "orderByNullPosition",
            ParamKind::String,
            "Where nulls sort: first or last",
        ),
        ParamSpec::new("order_direction", "orderDirection", ParamKind::String, "asc or desc"),
        ParamSpec::new("query_filter", "queryFilter", ParamKind::String, "Filter expression"),
        ParamSpec::new("pagination_seed", "paginationSeed", ParamKind::String, "Seed for random ordering"),
        ParamSpec::new("page", "page", ParamKind::Integer, "Page number"),
        ParamSpec::new("per_page", "perPage", ParamKind::Integer, "Items per page"),
    ]
}

fn recipe_filters() -> Vec<ParamSpec> {
    vec![
        ParamSpec::new("search", "search", ParamKind::String, "Free text search"),
        ParamSpec::new("categories", "categories", ParamKind::StringArray, "Category ids or slugs"),
        ParamSpec::new("tags", "tags", ParamKind::StringArray, "Tag ids or slugs"),
        ParamSpec::new("tools", "tools", ParamKind::StringArray, "Tool ids or slugs"),
        ParamSpec::new("foods", "foods", ParamKind::StringArray, "Food ids or slugs"),
        ParamSpec::new("households", "households", ParamKind::StringArray, "Household ids or slugs"),
        ParamSpec::new("cookbook", "cookbook", ParamKind::String, "Cookbook id or slug"),
        ParamSpec::new(
            "require_all_categories",
            "requireAllCategories",
            ParamKind::Boolean,
            "Match all categories instead of any",
        ),
        ParamSpec::new("require_all_tags", "requireAllTags", ParamKind::Boolean, "Match all tags instead of any"),
        ParamSpec::new("require_all_tools", "requireAllTools", ParamKind::Boolean, "Match all tools instead of any"),
        ParamSpec::new("require_all_foods", "requireAllFoods", ParamKind::Boolean, "Match all foods instead of any"),
    ]
}

fn mealie_tools() -> Vec<ToolDefinition> {
    use HttpMethod::*;

    vec![
        // App and user
        ToolDefinition::new(
            "get_startup_info",
            Get,
            "/api/app/about/startup-info",
            "Get startup information about the recipe server",
        )
        .with_credential_overrides(),
        ToolDefinition::new("get_logged_in_user", Get, "/api/users/self", "Get the current user")
            .with_credential_overrides(),
        // Recipes
        ToolDefinition::new("get_recipes", Get, "/api/recipes", "List and search recipes")
            .queries(recipe_filters())
            .queries(pagination())
            .with_credential_overrides(),
        ToolDefinition::new("get_recipe", Get, "/api/recipes/{slug}", "Get one recipe by slug")
            .with_credential_overrides(),
        ToolDefinition::new("create_recipe", Post, "/api/recipes", "Create a recipe")
            .body(true, "Recipe to create, e.g. {\"name\": \"Soup\"}"),
        ToolDefinition::new(
            "create_recipe_from_url",
            Post,
            "/api/recipes/create/url",
            "Scrape and create a recipe from a web page",
        )
        .body(true, "Scrape request, e.g. {\"url\": \"https://...\", \"includeTags\": true}"),
        ToolDefinition::new("update_recipe", Put, "/api/recipes/{slug}", "Replace a recipe")
            .body(true, "Full recipe"),
        ToolDefinition::new("patch_recipe", Patch, "/api/recipes/{slug}", "Update selected recipe fields")
            .body(true, "Fields to change"),
        ToolDefinition::new("delete_recipe", Delete, "/api/recipes/{slug}", "Delete a recipe"),
        ToolDefinition::new(
            "duplicate_recipe",
            Post,
            "/api/recipes/{slug}/duplicate",
            "Duplicate a recipe",
        )
        .body(false, "Optional new name, e.g. {\"name\": \"Soup (copy)\"}"),
        ToolDefinition::new(
            "update_recipe_last_made",
            Patch,
            "/api/recipes/{slug}/last-made",
            "Set the date a recipe was last made",
        )
        .body(true, "Timestamp, e.g. {\"timestamp\": \"2024-01-01T18:00:00\"}"),
        ToolDefinition::new(
            "get_recipe_comments",
            Get,
            "/api/recipes/{slug}/comments",
            "List comments on a recipe",
        ),
        ToolDefinition::new(
            "get_recipe_suggestions",
            Get,
            "/api/recipes/suggestions",
            "Suggest recipes from foods and tools on hand",
        )
        .query(ParamSpec::new("foods", "foods", ParamKind::StringArray, "Food ids on hand"))
        .query(ParamSpec::new("tools", "tools", ParamKind::StringArray, "Tool ids on hand"))
        .query(ParamSpec::new("limit", "limit", ParamKind::Integer, "Maximum suggestions"))
        .query(ParamSpec::new(
            "max_missing_foods",
            "maxMissingFoods",
            ParamKind::Integer,
            "Allowed missing foods",
        )),
        // Meal plans
        ToolDefinition::new("get_mealplans", Get, "/api/households/mealplans", "List meal plan entries")
            .query(ParamSpec::new("start_date", "start_date", ParamKind::String, "First day, YYYY-MM-DD"))
            .query(ParamSpec::new("end_date", "end_date", ParamKind::String, "Last day, YYYY-MM-DD"))
            .queries(pagination()),
        ToolDefinition::new(
            "get_todays_mealplan",
            Get,
            "/api/households/mealplans/today",
            "Get today's meal plan entries",
        ),
        ToolDefinition::new(
            "get_mealplan",
            Get,
            "/api/households/mealplans/{item_id}",
            "Get one meal plan entry",
        ),
        ToolDefinition::new("create_mealplan", Post, "/api/households/mealplans", "Add a meal plan entry")
            .body(true, "Entry, e.g. {\"date\": \"2024-01-01\", \"entryType\": \"dinner\", \"recipeId\": \"...\"}"),
        ToolDefinition::new(
            "create_random_mealplan",
            Post,
            "/api/households/mealplans/random",
            "Add a random meal plan entry following the household rules",
        )
        .body(true, "Date and entry type, e.g. {\"date\": \"2024-01-01\", \"entryType\": \"dinner\"}"),
        ToolDefinition::new(
            "update_mealplan",
            Put,
            "/api/households/mealplans/{item_id}",
            "Replace a meal plan entry",
        )
        .body(true, "Full entry"),
        ToolDefinition::new(
            "delete_mealplan",
            Delete,
            "/api/households/mealplans/{item_id}",
            "Delete a meal plan entry",
        ),
        ToolDefinition::new(
            "get_mealplan_rules",
            Get,
            "/api/households/mealplans/rules",
            "List meal plan rules",
        )
        .queries(pagination()),
        // Shopping lists
        ToolDefinition::new(
            "get_shopping_lists",
            Get,
            "/api/households/shopping/lists",
            "List shopping lists",
        )
        .queries(pagination()),
        ToolDefinition::new(
            "get_shopping_list",
            Get,
            "/api/households/shopping/lists/{item_id}",
            "Get one shopping list with its items",
        ),
        ToolDefinition::new(
            "create_shopping_list",
            Post,
            "/api/households/shopping/lists",
            "Create a shopping list",
        )
        .body(true, "List, e.g. {\"name\": \"Weekly\"}"),
        ToolDefinition::new(
            "delete_shopping_list",
            Delete,
            "/api/households/shopping/lists/{item_id}",
            "Delete a shopping list",
        ),
        ToolDefinition::new(
            "add_recipe_ingredients_to_list",
            Post,
            "/api/households/shopping/lists/{item_id}/recipe",
            "Add the ingredients of one or more recipes to a shopping list",
        )
        .body(true, "Recipes, e.g. [{\"recipeId\": \"...\", \"recipeIncrementQuantity\": 1}]"),
        ToolDefinition::new(
            "remove_recipe_ingredients_from_list",
            Post,
            "/api/households/shopping/lists/{item_id}/recipe/{recipe_id}/delete",
            "Remove a recipe's ingredients from a shopping list",
        )
        .body(false, "Optional quantity, e.g. {\"recipeDecrementQuantity\": 1}"),
        // Cookbooks and organizers
        ToolDefinition::new("get_cookbooks", Get, "/api/households/cookbooks", "List cookbooks")
            .queries(pagination()),
        ToolDefinition::new("get_categories", Get, "/api/organizers/categories", "List recipe categories")
            .query(ParamSpec::new("search", "search", ParamKind::String, "Free text search"))
            .queries(pagination()),
        ToolDefinition::new("get_tags", Get, "/api/organizers/tags", "List recipe tags")
            .query(ParamSpec::new("search", "search", ParamKind::String, "Free text search"))
            .queries(pagination()),
        ToolDefinition::new("create_tag", Post, "/api/organizers/tags", "Create a recipe tag")
            .body(true, "Tag, e.g. {\"name\": \"Quick\"}"),
        ToolDefinition::new("get_foods", Get, "/api/foods", "List foods")
            .query(ParamSpec::new("search", "search", ParamKind::String, "Free text search"))
            .queries(pagination()),
    ]
}
